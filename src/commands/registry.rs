//! Command registry.
//!
//! Maps command names to handlers. The registry is built once at startup and
//! injected into every [`CommandHandler`](super::CommandHandler); tests can
//! build a reduced one with [`CommandRegistry::new`] and
//! [`CommandRegistry::register`].

use crate::commands::{hash, server, string};
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A command that can be executed against the keyspace.
pub trait Command: Send + Sync {
    /// Uppercase command name, e.g. `"SET"`.
    fn name(&self) -> &'static str;

    /// Whether the command mutates the keyspace and belongs in the AOF.
    fn is_write(&self) -> bool {
        false
    }

    /// Runs the command. `args` excludes the command name.
    fn execute(&self, storage: &StorageEngine, args: &[RespValue]) -> RespValue;
}

/// Signature of a plain function handler.
pub type HandlerFn = fn(&StorageEngine, &[RespValue]) -> RespValue;

/// A [`Command`] backed by a plain function.
#[derive(Clone, Copy)]
pub struct FnCommand {
    name: &'static str,
    write: bool,
    handler: HandlerFn,
}

impl FnCommand {
    /// A command that only reads the keyspace (or not at all).
    pub const fn read(name: &'static str, handler: HandlerFn) -> Self {
        Self {
            name,
            write: false,
            handler,
        }
    }

    /// A command that mutates the keyspace.
    pub const fn write(name: &'static str, handler: HandlerFn) -> Self {
        Self {
            name,
            write: true,
            handler,
        }
    }
}

impl Command for FnCommand {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_write(&self) -> bool {
        self.write
    }

    fn execute(&self, storage: &StorageEngine, args: &[RespValue]) -> RespValue {
        (self.handler)(storage, args)
    }
}

/// Lookup table from uppercase command name to handler.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<&'static str, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in command.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .register(FnCommand::read("PING", server::ping))
            .register(FnCommand::read("ECHO", server::echo))
            .register(FnCommand::write("SET", string::set))
            .register(FnCommand::read("GET", string::get))
            .register(FnCommand::write("DEL", string::del))
            .register(FnCommand::write("HSET", hash::hset))
            .register(FnCommand::read("HGET", hash::hget));
        registry
    }

    /// Adds a command, replacing any command with the same name.
    pub fn register(&mut self, command: impl Command + 'static) -> &mut Self {
        self.commands.insert(command.name(), Arc::new(command));
        self
    }

    /// Looks up a command by its uppercase name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(name)
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if no command is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.commands.keys().collect();
        names.sort();
        f.debug_struct("CommandRegistry")
            .field("commands", &names)
            .finish()
    }
}
