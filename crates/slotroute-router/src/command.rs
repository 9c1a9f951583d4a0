//! Supported store commands
//!
//! Every command goes through [`CommandRouter::execute`]; the per-command
//! methods generated here are shorthands for it.

use serde::{Deserialize, Serialize};
use slotroute_types::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::RouterError;
use crate::router::CommandRouter;

macro_rules! commands {
    ($( $variant:ident => $name:literal, $method:ident, $keyed:literal; )*) => {
        /// Store command understood by the router
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Command {
            $( $variant, )*
        }

        impl Command {
            pub const ALL: &'static [Command] = &[ $( Command::$variant, )* ];

            /// Wire name of the command
            pub fn name(&self) -> &'static str {
                match self {
                    $( Command::$variant => $name, )*
                }
            }

            /// Whether the first argument is a key that selects the slot
            pub fn is_keyed(&self) -> bool {
                match self {
                    $( Command::$variant => $keyed, )*
                }
            }
        }

        impl CommandRouter {
            $(
                #[doc = concat!("Run `", $name, "` through the router")]
                pub async fn $method<I, A>(&self, args: I) -> Result<Option<Value>, RouterError>
                where
                    I: IntoIterator<Item = A>,
                    A: Into<Vec<u8>>,
                {
                    self.execute(Command::$variant, args).await
                }
            )*
        }
    };
}

commands! {
    // strings
    Get => "GET", get, true;
    Set => "SET", set, true;
    Append => "APPEND", append, true;
    Incr => "INCR", incr, true;
    IncrBy => "INCRBY", incrby, true;
    Decr => "DECR", decr, true;
    MGet => "MGET", mget, true;
    MSet => "MSET", mset, true;
    // keys
    Del => "DEL", del, true;
    Exists => "EXISTS", exists, true;
    Expire => "EXPIRE", expire, true;
    Ttl => "TTL", ttl, true;
    // hashes
    HGet => "HGET", hget, true;
    HSet => "HSET", hset, true;
    HDel => "HDEL", hdel, true;
    HGetAll => "HGETALL", hgetall, true;
    // lists
    LPush => "LPUSH", lpush, true;
    RPush => "RPUSH", rpush, true;
    LPop => "LPOP", lpop, true;
    RPop => "RPOP", rpop, true;
    LRange => "LRANGE", lrange, true;
    // sets
    SAdd => "SADD", sadd, true;
    SRem => "SREM", srem, true;
    SMembers => "SMEMBERS", smembers, true;
    // server
    Ping => "PING", ping, false;
    Echo => "ECHO", echo, false;
}

impl FromStr for Command {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| RouterError::UnknownCommand(s.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
