//! Command Dispatcher
//!
//! [`CommandHandler`] validates the shape of a request, canonicalises the
//! command name to uppercase and runs the matching [`Command`] from its
//! registry.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌──────────────────┐   ┌────────────┐   ┌─────────────┐    │
//! │  │ parse_request()  │──>│ dispatch() │──>│  registry   │    │
//! │  └──────────────────┘   └────────────┘   └──────┬──────┘    │
//! │                                                 ▼           │
//! │                                          StorageEngine      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The handler knows nothing about sockets or the AOF. Callers ask
//! [`CommandHandler::is_write`] to decide whether a request gets logged.

use crate::commands::registry::{Command, CommandRegistry};
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use std::sync::Arc;

/// Dispatches requests to the commands of a registry.
///
/// Cheap to clone: every connection gets its own copy sharing the same
/// keyspace and registry.
#[derive(Clone, Debug)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    registry: Arc<CommandRegistry>,
}

impl CommandHandler {
    /// Creates a handler with the standard command set.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self::with_registry(storage, Arc::new(CommandRegistry::standard()))
    }

    /// Creates a handler over a custom registry.
    pub fn with_registry(storage: Arc<StorageEngine>, registry: Arc<CommandRegistry>) -> Self {
        Self { storage, registry }
    }

    /// The keyspace this handler operates on.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Splits a request into its uppercase command name and arguments.
    ///
    /// A request must be a non-empty array whose first element is a string.
    /// Anything else yields the error reply to send back.
    pub fn parse_request(request: &RespValue) -> Result<(String, &[RespValue]), RespValue> {
        let parts = match request {
            RespValue::Array(parts) => parts,
            _ => return Err(RespValue::error("ERR invalid request, expected array")),
        };

        let (name, args) = match parts.split_first() {
            Some(split) => split,
            None => return Err(RespValue::error("ERR empty command")),
        };

        match name.as_bytes().map(std::str::from_utf8) {
            Some(Ok(name)) => Ok((name.to_uppercase(), args)),
            _ => Err(RespValue::error("ERR invalid command name")),
        }
    }

    /// Validates and executes a full request array.
    pub fn execute(&self, request: &RespValue) -> RespValue {
        match Self::parse_request(request) {
            Ok((name, args)) => self.dispatch(&name, args),
            Err(reply) => reply,
        }
    }

    /// Runs the command `name` with `args`.
    ///
    /// `name` is matched case-insensitively.
    pub fn dispatch(&self, name: &str, args: &[RespValue]) -> RespValue {
        match self.lookup(name) {
            Some(command) => command.execute(&self.storage, args),
            None => RespValue::error(format!("ERR unknown command '{}'", name)),
        }
    }

    /// Whether `name` is a registered command that mutates the keyspace.
    pub fn is_write(&self, name: &str) -> bool {
        self.lookup(name).map(|c| c.is_write()).unwrap_or(false)
    }

    fn lookup(&self, name: &str) -> Option<&Arc<dyn Command>> {
        if name.bytes().any(|b| b.is_ascii_lowercase()) {
            self.registry.get(&name.to_ascii_uppercase())
        } else {
            self.registry.get(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::registry::FnCommand;
    use crate::commands::server;
    use bytes::Bytes;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(StorageEngine::new()))
    }

    fn make_command(args: &[&str]) -> RespValue {
        RespValue::Array(
            args.iter()
                .map(|s| RespValue::bulk_string(Bytes::from(s.to_string())))
                .collect(),
        )
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        let response = handler.execute(&make_command(&["PING"]));
        assert_eq!(response, RespValue::simple_string("PONG"));

        let response = handler.execute(&make_command(&["PING", "hi"]));
        assert_eq!(response, RespValue::simple_string("hi"));
    }

    #[test]
    fn test_case_insensitive_names() {
        let handler = create_handler();

        assert_eq!(handler.execute(&make_command(&["set", "k", "v"])), RespValue::ok());
        assert_eq!(
            handler.execute(&make_command(&["GeT", "k"])),
            RespValue::bulk_string(Bytes::from("v"))
        );
        assert!(handler.is_write("hset"));
        assert!(!handler.is_write("get"));
        assert!(!handler.is_write("nosuch"));
    }

    #[test]
    fn test_set_get_hset_hget() {
        let handler = create_handler();

        assert_eq!(handler.execute(&make_command(&["SET", "key", "value"])), RespValue::ok());
        assert_eq!(
            handler.execute(&make_command(&["GET", "key"])),
            RespValue::bulk_string(Bytes::from("value"))
        );
        assert_eq!(
            handler.execute(&make_command(&["HSET", "h", "f", "v"])),
            RespValue::ok()
        );
        assert_eq!(
            handler.execute(&make_command(&["HGET", "h", "f"])),
            RespValue::bulk_string(Bytes::from("v"))
        );
        assert_eq!(handler.execute(&make_command(&["HGET", "h", "x"])), RespValue::null());
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(&make_command(&["foo", "bar"])),
            RespValue::error("ERR unknown command 'FOO'")
        );
    }

    #[test]
    fn test_request_shape_errors() {
        let handler = create_handler();

        assert!(handler.execute(&RespValue::simple_string("PING")).is_error());
        assert!(handler.execute(&RespValue::Array(vec![])).is_error());
        assert!(handler.execute(&RespValue::NullArray).is_error());
        assert!(handler
            .execute(&RespValue::Array(vec![RespValue::integer(1)]))
            .is_error());
    }

    #[test]
    fn test_parse_request() {
        let request = make_command(&["hset", "h", "f", "v"]);
        let (name, args) = CommandHandler::parse_request(&request).unwrap();
        assert_eq!(name, "HSET");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_reduced_registry() {
        let mut registry = CommandRegistry::new();
        registry.register(FnCommand::read("PING", server::ping));
        let handler =
            CommandHandler::with_registry(Arc::new(StorageEngine::new()), Arc::new(registry));

        assert_eq!(handler.execute(&make_command(&["PING"])), RespValue::pong());
        assert!(handler.execute(&make_command(&["SET", "k", "v"])).is_error());
        assert!(handler.storage().is_empty());
    }

    #[test]
    fn test_handlers_share_storage() {
        let storage = Arc::new(StorageEngine::new());
        let a = CommandHandler::new(Arc::clone(&storage));
        let b = a.clone();

        a.execute(&make_command(&["SET", "k", "v"]));
        assert_eq!(
            b.execute(&make_command(&["GET", "k"])),
            RespValue::bulk_string(Bytes::from("v"))
        );
    }

    /// Everything a write could touch in the fixture keyspace.
    fn snapshot(handler: &CommandHandler) -> Vec<RespValue> {
        let mut state: Vec<RespValue> = ["GET a", "GET b", "GET h", "HGET h f", "HGET a f"]
            .iter()
            .map(|cmd| handler.execute(&make_command(&cmd.split(' ').collect::<Vec<_>>())))
            .collect();
        let stats = handler.storage().stats();
        state.push(RespValue::integer(stats.string_keys as i64));
        state.push(RespValue::integer(stats.hash_keys as i64));
        state
    }

    #[test]
    fn test_rejected_writes_change_nothing() {
        let handler = create_handler();
        handler.execute(&make_command(&["SET", "a", "1"]));
        handler.execute(&make_command(&["SET", "b", "2", "PX", "60000"]));
        handler.execute(&make_command(&["HSET", "h", "f", "v"]));
        let before = snapshot(&handler);

        let bulk = |s: &str| RespValue::bulk_string(Bytes::from(s.to_string()));
        let rejected = [
            make_command(&["SET", "a"]),
            make_command(&["SET", "a", "x", "PX"]),
            make_command(&["SET", "a", "x", "PX", "0"]),
            make_command(&["SET", "a", "x", "PX", "+10"]),
            make_command(&["SET", "a", "x", "EX", "10"]),
            make_command(&["SET", "a", "x", "PX", "10", "PX", "10"]),
            RespValue::array(vec![bulk("SET"), RespValue::integer(1), bulk("x")]),
            RespValue::array(vec![bulk("SET"), bulk("a"), bulk("x"), RespValue::Null]),
            make_command(&["DEL"]),
            RespValue::array(vec![bulk("DEL"), bulk("a"), bulk("h"), RespValue::integer(1)]),
            RespValue::array(vec![bulk("DEL"), RespValue::Null, bulk("b")]),
            make_command(&["HSET", "h", "f"]),
            make_command(&["HSET", "h", "f", "w", "extra"]),
            RespValue::array(vec![bulk("HSET"), bulk("h"), bulk("f"), RespValue::integer(3)]),
        ];

        for request in &rejected {
            let (name, _) = CommandHandler::parse_request(request).unwrap();
            assert!(handler.is_write(&name));
            assert!(handler.execute(request).is_error(), "{:?}", request);
            assert_eq!(snapshot(&handler), before, "{:?} changed the keyspace", request);
        }
    }
}
