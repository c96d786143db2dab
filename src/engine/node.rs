//! A single keyspace node
//!
//! Owns one shard of the keyspace and executes the command table against it.
//! Arity validation is split out from execution so transactions can validate
//! the whole queue before any effect happens.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::command::RequestType;
use crate::value::WireValue;

use super::retry::ServerFailure;

/// One cluster node: an address, a key/value store, and a transaction lock
/// serializing atomic batches against it.
pub struct Node {
    address: String,
    required_password: Option<Vec<u8>>,
    store: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    txn_lock: Mutex<()>,
}

impl Node {
    pub fn new(address: String, required_password: Option<Vec<u8>>) -> Self {
        Self {
            address,
            required_password,
            store: RwLock::new(HashMap::new()),
            txn_lock: Mutex::new(()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Runs `body` as one execution unit: no other transaction interleaves.
    pub fn in_transaction<T>(&self, body: impl FnOnce() -> T) -> T {
        let _guard = self.txn_lock.lock();
        body()
    }

    /// Validates the argument count for an opcode without executing it.
    pub fn check_arity(request_type: RequestType, arg_count: usize) -> Result<(), ServerFailure> {
        let valid = match request_type {
            RequestType::Invalid => false,
            RequestType::Ping => arg_count <= 1,
            RequestType::Echo => arg_count == 1,
            RequestType::Get => arg_count == 1,
            RequestType::Set => arg_count == 2,
            RequestType::Del => arg_count == 1,
            RequestType::Exists => arg_count == 1,
            RequestType::Append => arg_count == 2,
            RequestType::Incr => arg_count == 1,
            RequestType::Auth => arg_count == 1,
            RequestType::Custom => arg_count >= 1,
        };
        if valid {
            Ok(())
        } else {
            Err(ServerFailure::Request(format!(
                "wrong number of arguments for {:?}",
                request_type
            )))
        }
    }

    /// Executes one command against this node's store.
    pub fn execute(
        &self,
        request_type: RequestType,
        args: &[Bytes],
    ) -> Result<WireValue, ServerFailure> {
        Self::check_arity(request_type, args.len())?;
        match request_type {
            RequestType::Invalid => Err(ServerFailure::Request(
                "invalid request type".to_string(),
            )),
            RequestType::Ping => Ok(match args.first() {
                Some(payload) => WireValue::Bytes(payload.to_vec()),
                None => WireValue::bytes(&b"PONG"[..]),
            }),
            RequestType::Echo => Ok(WireValue::Bytes(args[0].to_vec())),
            RequestType::Get => {
                let store = self.store.read();
                Ok(match store.get(args[0].as_ref()) {
                    Some(value) => WireValue::Bytes(value.clone()),
                    None => WireValue::Null,
                })
            }
            RequestType::Set => {
                self.store
                    .write()
                    .insert(args[0].to_vec(), args[1].to_vec());
                Ok(WireValue::Ok)
            }
            RequestType::Del => {
                let removed = self.store.write().remove(args[0].as_ref()).is_some();
                Ok(WireValue::Int(removed as i64))
            }
            RequestType::Exists => {
                let present = self.store.read().contains_key(args[0].as_ref());
                Ok(WireValue::Bool(present))
            }
            RequestType::Append => {
                let mut store = self.store.write();
                let value = store.entry(args[0].to_vec()).or_default();
                value.extend_from_slice(&args[1]);
                Ok(WireValue::Int(value.len() as i64))
            }
            RequestType::Incr => {
                let mut store = self.store.write();
                let slot = store.entry(args[0].to_vec()).or_insert_with(|| b"0".to_vec());
                let current: i64 = std::str::from_utf8(slot)
                    .ok()
                    .and_then(|text| text.parse().ok())
                    .ok_or_else(|| {
                        ServerFailure::Request(
                            "value is not an integer or out of range".to_string(),
                        )
                    })?;
                let next = current.checked_add(1).ok_or_else(|| {
                    ServerFailure::Request(
                        "value is not an integer or out of range".to_string(),
                    )
                })?;
                *slot = next.to_string().into_bytes();
                Ok(WireValue::Int(next))
            }
            RequestType::Auth => {
                let offered = args[0].as_ref();
                match &self.required_password {
                    Some(required) if required.as_slice() == offered => Ok(WireValue::Ok),
                    Some(_) => Err(ServerFailure::Request(
                        "WRONGPASS invalid password".to_string(),
                    )),
                    None => Err(ServerFailure::Request(
                        "client sent AUTH, but no password is set".to_string(),
                    )),
                }
            }
            RequestType::Custom => self.execute_custom(args),
        }
    }

    /// Resolves a raw pass-through command by name, case-insensitively.
    fn execute_custom(&self, args: &[Bytes]) -> Result<WireValue, ServerFailure> {
        let name = args[0].to_ascii_uppercase();
        let resolved = match name.as_slice() {
            b"PING" => RequestType::Ping,
            b"ECHO" => RequestType::Echo,
            b"GET" => RequestType::Get,
            b"SET" => RequestType::Set,
            b"DEL" => RequestType::Del,
            b"EXISTS" => RequestType::Exists,
            b"APPEND" => RequestType::Append,
            b"INCR" => RequestType::Incr,
            b"AUTH" => RequestType::Auth,
            _ => {
                return Err(ServerFailure::Request(format!(
                    "unknown command '{}'",
                    String::from_utf8_lossy(&args[0])
                )))
            }
        };
        self.execute(resolved, &args[1..])
    }
}
