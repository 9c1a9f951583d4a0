//! Per-node keyspace of the simulator
//!
//! Just enough command semantics to drive the router end to end.

use slotroute_router::{Command, CommandCall};
use slotroute_types::{NodeError, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Entry {
    Str(Vec<u8>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    List(VecDeque<Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Stored {
    entry: Entry,
    ttl: Option<i64>,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Keyspace {
    entries: HashMap<Vec<u8>, Stored>,
}

impl Keyspace {
    pub(crate) fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove and return every key matching `pred`
    pub(crate) fn drain_keys(&mut self, pred: impl Fn(&[u8]) -> bool) -> Vec<(Vec<u8>, StoredEntry)> {
        let keys: Vec<Vec<u8>> = self.entries.keys().filter(|k| pred(k)).cloned().collect();
        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|v| (k, StoredEntry(v))))
            .collect()
    }

    pub(crate) fn insert_entry(&mut self, key: Vec<u8>, entry: StoredEntry) {
        self.entries.insert(key, entry.0);
    }

    pub(crate) fn apply(&mut self, call: &CommandCall) -> Result<Value, NodeError> {
        let args = &call.args;
        match call.command {
            Command::Ping => Ok(match args.first() {
                Some(msg) => Value::Bulk(msg.clone()),
                None => Value::Status("PONG".to_string()),
            }),
            Command::Echo => Ok(Value::Bulk(arg(args, 0, call)?.to_vec())),

            Command::Get => match self.entries.get(arg(args, 0, call)?) {
                None => Ok(Value::Nil),
                Some(Stored { entry: Entry::Str(v), .. }) => Ok(Value::Bulk(v.clone())),
                Some(_) => Err(NodeError::reply(WRONGTYPE)),
            },
            Command::Set => {
                let key = arg(args, 0, call)?.to_vec();
                let value = arg(args, 1, call)?.to_vec();
                self.entries.insert(key, Stored { entry: Entry::Str(value), ttl: None });
                Ok(Value::Ok)
            }
            Command::Append => {
                let suffix = arg(args, 1, call)?;
                let stored = self.entry_or(arg(args, 0, call)?, || Entry::Str(vec![]));
                match &mut stored.entry {
                    Entry::Str(v) => {
                        v.extend_from_slice(suffix);
                        Ok(Value::Int(v.len() as i64))
                    }
                    _ => Err(NodeError::reply(WRONGTYPE)),
                }
            }
            Command::Incr => self.incr_by(arg(args, 0, call)?, 1),
            Command::Decr => self.incr_by(arg(args, 0, call)?, -1),
            Command::IncrBy => {
                let delta = int_arg(args, 1, call)?;
                self.incr_by(arg(args, 0, call)?, delta)
            }
            Command::MGet => Ok(Value::Array(
                args.iter()
                    .map(|k| match self.entries.get(k) {
                        Some(Stored { entry: Entry::Str(v), .. }) => Value::Bulk(v.clone()),
                        _ => Value::Nil,
                    })
                    .collect(),
            )),
            Command::MSet => {
                if args.is_empty() || args.len() % 2 != 0 {
                    return Err(wrong_arity(call));
                }
                for pair in args.chunks(2) {
                    self.entries.insert(
                        pair[0].clone(),
                        Stored { entry: Entry::Str(pair[1].clone()), ttl: None },
                    );
                }
                Ok(Value::Ok)
            }

            Command::Del => {
                require(args, 1, call)?;
                Ok(Value::Int(args.iter().filter(|k| self.entries.remove(*k).is_some()).count() as i64))
            }
            Command::Exists => {
                require(args, 1, call)?;
                Ok(Value::Int(args.iter().filter(|k| self.entries.contains_key(*k)).count() as i64))
            }
            Command::Expire => {
                let seconds = int_arg(args, 1, call)?;
                match self.entries.get_mut(arg(args, 0, call)?) {
                    Some(stored) => {
                        stored.ttl = Some(seconds);
                        Ok(Value::Int(1))
                    }
                    None => Ok(Value::Int(0)),
                }
            }
            Command::Ttl => Ok(Value::Int(match self.entries.get(arg(args, 0, call)?) {
                None => -2,
                Some(stored) => stored.ttl.unwrap_or(-1),
            })),

            Command::HGet => {
                let field = arg(args, 1, call)?;
                match self.entries.get(arg(args, 0, call)?) {
                    None => Ok(Value::Nil),
                    Some(Stored { entry: Entry::Hash(h), .. }) => {
                        Ok(h.get(field).cloned().map(Value::Bulk).unwrap_or(Value::Nil))
                    }
                    Some(_) => Err(NodeError::reply(WRONGTYPE)),
                }
            }
            Command::HSet => {
                if args.len() < 3 || args.len() % 2 == 0 {
                    return Err(wrong_arity(call));
                }
                let stored = self.entry_or(&args[0], || Entry::Hash(BTreeMap::new()));
                match &mut stored.entry {
                    Entry::Hash(h) => {
                        let added = args[1..]
                            .chunks(2)
                            .filter(|pair| h.insert(pair[0].clone(), pair[1].clone()).is_none())
                            .count();
                        Ok(Value::Int(added as i64))
                    }
                    _ => Err(NodeError::reply(WRONGTYPE)),
                }
            }
            Command::HDel => {
                require(args, 2, call)?;
                match self.entries.get_mut(&args[0]) {
                    None => Ok(Value::Int(0)),
                    Some(Stored { entry: Entry::Hash(h), .. }) => {
                        Ok(Value::Int(args[1..].iter().filter(|f| h.remove(*f).is_some()).count() as i64))
                    }
                    Some(_) => Err(NodeError::reply(WRONGTYPE)),
                }
            }
            Command::HGetAll => match self.entries.get(arg(args, 0, call)?) {
                None => Ok(Value::Array(vec![])),
                Some(Stored { entry: Entry::Hash(h), .. }) => Ok(Value::Array(
                    h.iter()
                        .flat_map(|(f, v)| [Value::Bulk(f.clone()), Value::Bulk(v.clone())])
                        .collect(),
                )),
                Some(_) => Err(NodeError::reply(WRONGTYPE)),
            },

            Command::LPush | Command::RPush => {
                require(args, 2, call)?;
                let front = call.command == Command::LPush;
                let stored = self.entry_or(&args[0], || Entry::List(VecDeque::new()));
                match &mut stored.entry {
                    Entry::List(list) => {
                        for item in &args[1..] {
                            if front {
                                list.push_front(item.clone());
                            } else {
                                list.push_back(item.clone());
                            }
                        }
                        Ok(Value::Int(list.len() as i64))
                    }
                    _ => Err(NodeError::reply(WRONGTYPE)),
                }
            }
            Command::LPop | Command::RPop => {
                let key = arg(args, 0, call)?;
                match self.entries.get_mut(key) {
                    None => Ok(Value::Nil),
                    Some(Stored { entry: Entry::List(list), .. }) => {
                        let item = if call.command == Command::LPop {
                            list.pop_front()
                        } else {
                            list.pop_back()
                        };
                        if list.is_empty() {
                            self.entries.remove(key);
                        }
                        Ok(item.map(Value::Bulk).unwrap_or(Value::Nil))
                    }
                    Some(_) => Err(NodeError::reply(WRONGTYPE)),
                }
            }
            Command::LRange => {
                let start = int_arg(args, 1, call)?;
                let stop = int_arg(args, 2, call)?;
                match self.entries.get(&args[0]) {
                    None => Ok(Value::Array(vec![])),
                    Some(Stored { entry: Entry::List(list), .. }) => {
                        let len = list.len() as i64;
                        let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
                        let (start, stop) = (norm(start), norm(stop).min(len - 1));
                        if start > stop {
                            return Ok(Value::Array(vec![]));
                        }
                        Ok(Value::Array(
                            list.iter()
                                .skip(start as usize)
                                .take((stop - start + 1) as usize)
                                .cloned()
                                .map(Value::Bulk)
                                .collect(),
                        ))
                    }
                    Some(_) => Err(NodeError::reply(WRONGTYPE)),
                }
            }

            Command::SAdd => {
                require(args, 2, call)?;
                let stored = self.entry_or(&args[0], || Entry::Set(BTreeSet::new()));
                match &mut stored.entry {
                    Entry::Set(set) => Ok(Value::Int(
                        args[1..].iter().filter(|m| set.insert((*m).clone())).count() as i64,
                    )),
                    _ => Err(NodeError::reply(WRONGTYPE)),
                }
            }
            Command::SRem => {
                require(args, 2, call)?;
                match self.entries.get_mut(&args[0]) {
                    None => Ok(Value::Int(0)),
                    Some(Stored { entry: Entry::Set(set), .. }) => {
                        Ok(Value::Int(args[1..].iter().filter(|m| set.remove(*m)).count() as i64))
                    }
                    Some(_) => Err(NodeError::reply(WRONGTYPE)),
                }
            }
            Command::SMembers => match self.entries.get(arg(args, 0, call)?) {
                None => Ok(Value::Array(vec![])),
                Some(Stored { entry: Entry::Set(set), .. }) => {
                    Ok(Value::Array(set.iter().cloned().map(Value::Bulk).collect()))
                }
                Some(_) => Err(NodeError::reply(WRONGTYPE)),
            },
        }
    }

    fn entry_or(&mut self, key: &[u8], make: impl FnOnce() -> Entry) -> &mut Stored {
        self.entries
            .entry(key.to_vec())
            .or_insert_with(|| Stored { entry: make(), ttl: None })
    }

    fn incr_by(&mut self, key: &[u8], delta: i64) -> Result<Value, NodeError> {
        let stored = self.entry_or(key, || Entry::Str(b"0".to_vec()));
        let Entry::Str(raw) = &mut stored.entry else {
            return Err(NodeError::reply(WRONGTYPE));
        };
        let current: i64 = std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| NodeError::reply("ERR value is not an integer or out of range"))?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| NodeError::reply("ERR increment or decrement would overflow"))?;
        *raw = next.to_string().into_bytes();
        Ok(Value::Int(next))
    }
}

/// Opaque keyspace entry, moved between nodes during slot migration
#[derive(Debug, Clone)]
pub(crate) struct StoredEntry(Stored);

fn wrong_arity(call: &CommandCall) -> NodeError {
    NodeError::reply(format!(
        "ERR wrong number of arguments for '{}' command",
        call.command.name().to_lowercase()
    ))
}

fn require(args: &[Vec<u8>], count: usize, call: &CommandCall) -> Result<(), NodeError> {
    if args.len() < count {
        return Err(wrong_arity(call));
    }
    Ok(())
}

fn arg<'a>(args: &'a [Vec<u8>], idx: usize, call: &CommandCall) -> Result<&'a [u8], NodeError> {
    args.get(idx).map(Vec::as_slice).ok_or_else(|| wrong_arity(call))
}

fn int_arg(args: &[Vec<u8>], idx: usize, call: &CommandCall) -> Result<i64, NodeError> {
    std::str::from_utf8(arg(args, idx, call)?)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| NodeError::reply("ERR value is not an integer or out of range"))
}
