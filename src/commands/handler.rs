//! Command Handler
//!
//! Maps a decoded argument list to a store operation and a [`Reply`].
//!
//! ## Supported Commands
//!
//! | Command                  | Reply                                    |
//! |--------------------------|------------------------------------------|
//! | `PING`                   | `+PONG`                                  |
//! | `ECHO msg [msg ...]`     | bulk: arguments joined by single spaces  |
//! | `SET key value`          | `+OK`                                    |
//! | `GET key`                | bulk, or nil when missing                |
//! | `DEL key [key ...]`      | integer: number of keys removed          |
//! | `MGET key [key ...]`     | array; a missing key yields an empty bulk|
//! | `EXPIRE key seconds`     | integer: 1 if the key exists, else 0     |
//! | `TTL key`                | integer: seconds left, -1 or -2          |
//!
//! `execute` is total: every argument list, however malformed, produces
//! exactly one reply. Problems with a command are reported to the client as
//! error replies and never end the connection.

use crate::protocol::Reply;
use crate::storage::Store;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

/// Dispatches commands against a shared [`Store`].
///
/// The handler holds no per-connection state; cloning it only clones the
/// `Arc` to the store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<Store>,
}

/// How many arguments (after the command name) a command accepts.
#[derive(Debug, Clone, Copy)]
enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exactly(expected) => n == expected,
            Arity::AtLeast(min) => n >= min,
        }
    }
}

/// Command table: name, arity of its arguments.
const COMMANDS: &[(&str, Arity)] = &[
    ("PING", Arity::Exactly(0)),
    ("ECHO", Arity::AtLeast(1)),
    ("SET", Arity::Exactly(2)),
    ("GET", Arity::Exactly(1)),
    ("DEL", Arity::AtLeast(1)),
    ("MGET", Arity::AtLeast(1)),
    ("EXPIRE", Arity::Exactly(2)),
    ("TTL", Arity::Exactly(1)),
];

impl CommandHandler {
    /// Creates a new command handler with the given store.
    pub fn new(storage: Arc<Store>) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the reply.
    ///
    /// `args[0]` is the command name, matched case-insensitively; the rest
    /// are its arguments.
    pub fn execute(&self, args: Vec<Bytes>) -> Reply {
        let Some((name, args)) = args.split_first() else {
            return Reply::error("ERR empty command");
        };

        let cmd = String::from_utf8_lossy(name).to_uppercase();

        let Some(&(_, arity)) = COMMANDS.iter().find(|(known, _)| *known == cmd) else {
            // The name is echoed into a line-based reply
            let shown = cmd.replace(|c: char| c == '\r' || c == '\n', " ");
            return Reply::error(format!("ERR unknown command '{}'", shown));
        };

        if !arity.accepts(args.len()) {
            return Reply::error(format!(
                "ERR wrong number of arguments for '{}' command",
                cmd.to_lowercase()
            ));
        }

        self.dispatch(&cmd, args)
    }

    /// Runs a command whose name and arity have been validated.
    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> Reply {
        match cmd {
            "PING" => Reply::pong(),
            "ECHO" => self.cmd_echo(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "DEL" => self.cmd_del(args),
            "MGET" => self.cmd_mget(args),
            "EXPIRE" => self.cmd_expire(args),
            "TTL" => self.cmd_ttl(args),
            _ => Reply::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    /// ECHO message [message ...]
    fn cmd_echo(&self, args: &[Bytes]) -> Reply {
        if let [single] = args {
            return Reply::bulk(single.clone());
        }

        let len = args.iter().map(Bytes::len).sum::<usize>() + args.len() - 1;
        let mut joined = BytesMut::with_capacity(len);
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                joined.put_u8(b' ');
            }
            joined.extend_from_slice(arg);
        }
        Reply::bulk(joined.freeze())
    }

    /// SET key value
    fn cmd_set(&self, args: &[Bytes]) -> Reply {
        self.storage.set(args[0].clone(), args[1].clone());
        Reply::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Reply {
        match self.storage.get(&args[0]) {
            Some(value) => Reply::bulk(value),
            None => Reply::nil(),
        }
    }

    /// DEL key [key ...]
    fn cmd_del(&self, args: &[Bytes]) -> Reply {
        Reply::integer(self.storage.del(args) as i64)
    }

    /// MGET key [key ...]
    ///
    /// Missing keys come back as empty strings, not as nil.
    fn cmd_mget(&self, args: &[Bytes]) -> Reply {
        let values = args
            .iter()
            .map(|key| Some(self.storage.get(key).unwrap_or_default()))
            .collect();
        Reply::array(values)
    }

    /// EXPIRE key seconds
    fn cmd_expire(&self, args: &[Bytes]) -> Reply {
        let seconds = match parse_integer(&args[1]) {
            Some(s) => s,
            None => return Reply::error("ERR value is not an integer or out of range"),
        };

        if self.storage.expire(&args[0], seconds) {
            Reply::integer(1)
        } else {
            Reply::integer(0)
        }
    }

    /// TTL key
    fn cmd_ttl(&self, args: &[Bytes]) -> Reply {
        Reply::integer(self.storage.ttl(&args[0]))
    }
}

fn parse_integer(arg: &[u8]) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(Store::new()))
    }

    fn make_command(args: &[&str]) -> Vec<Bytes> {
        args.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        assert_eq!(handler.execute(make_command(&["PING"])), Reply::pong());
        assert_eq!(handler.execute(make_command(&["ping"])), Reply::pong());
    }

    #[test]
    fn test_unknown_command_name_cannot_break_framing() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["X\r\n+OK"]));
        assert_eq!(&response.encode()[..], b"-ERR unknown command 'X  +OK'\r\n");
    }

    #[test]
    fn test_ping_rejects_arguments() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["PING", "hello"]));
        assert_eq!(
            response,
            Reply::error("ERR wrong number of arguments for 'ping' command")
        );
    }

    #[test]
    fn test_echo_joins_arguments() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["ECHO", "hello"]));
        assert_eq!(response, Reply::bulk("hello"));

        let response = handler.execute(make_command(&["echo", "hello", "big", "world"]));
        assert_eq!(response, Reply::bulk("hello big world"));
    }

    #[test]
    fn test_echo_without_arguments() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["ECHO"]));
        assert_eq!(
            response,
            Reply::error("ERR wrong number of arguments for 'echo' command")
        );
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "key", "value"]));
        assert_eq!(response, Reply::ok());

        let response = handler.execute(make_command(&["GET", "key"]));
        assert_eq!(response, Reply::bulk("value"));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["GET", "nonexistent"]));
        assert_eq!(response, Reply::nil());
    }

    #[test]
    fn test_set_wrong_arity() {
        let handler = create_handler();

        for cmd in [&["SET", "k"][..], &["SET", "k", "v", "EX"][..]] {
            assert_eq!(
                handler.execute(make_command(cmd)),
                Reply::error("ERR wrong number of arguments for 'set' command")
            );
        }
    }

    #[test]
    fn test_get_wrong_arity() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["GET", "a", "b"])),
            Reply::error("ERR wrong number of arguments for 'get' command")
        );
    }

    #[test]
    fn test_del() {
        let handler = create_handler();

        handler.execute(make_command(&["SET", "key1", "value1"]));
        handler.execute(make_command(&["SET", "key2", "value2"]));

        let response = handler.execute(make_command(&["DEL", "key1", "key2", "key3"]));
        assert_eq!(response, Reply::integer(2));

        let response = handler.execute(make_command(&["DEL", "key1"]));
        assert_eq!(response, Reply::integer(0));
    }

    #[test]
    fn test_del_without_keys() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["DEL"])),
            Reply::error("ERR wrong number of arguments for 'del' command")
        );
    }

    #[test]
    fn test_mget_missing_is_empty_string() {
        let handler = create_handler();
        handler.execute(make_command(&["SET", "a", "1"]));

        let response = handler.execute(make_command(&["MGET", "a", "missing"]));
        assert_eq!(
            response,
            Reply::array(vec![Some(Bytes::from("1")), Some(Bytes::new())])
        );
        assert_eq!(&response.encode()[..], b"*2\r\n$1\r\n1\r\n$0\r\n\r\n");
    }

    #[test]
    fn test_mget_without_keys() {
        let handler = create_handler();

        assert!(handler.execute(make_command(&["MGET"])).is_error());
    }

    #[test]
    fn test_expire_and_ttl() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["EXPIRE", "k", "10"])),
            Reply::integer(0)
        );

        handler.execute(make_command(&["SET", "k", "v"]));
        assert_eq!(
            handler.execute(make_command(&["TTL", "k"])),
            Reply::integer(-1)
        );

        assert_eq!(
            handler.execute(make_command(&["EXPIRE", "k", "10"])),
            Reply::integer(1)
        );
        match handler.execute(make_command(&["TTL", "k"])) {
            Reply::Integer(ttl) => assert!((0..=10).contains(&ttl), "ttl was {}", ttl),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_expire_non_integer() {
        let handler = create_handler();
        handler.execute(make_command(&["SET", "k", "v"]));

        for bad in ["ten", "1.5", "", "99999999999999999999"] {
            assert_eq!(
                handler.execute(make_command(&["EXPIRE", "k", bad])),
                Reply::error("ERR value is not an integer or out of range")
            );
        }
        assert_eq!(
            handler.execute(make_command(&["TTL", "k"])),
            Reply::integer(-1)
        );
    }

    #[test]
    fn test_expire_non_positive_expires_immediately() {
        let handler = create_handler();
        handler.execute(make_command(&["SET", "k", "v"]));

        assert_eq!(
            handler.execute(make_command(&["EXPIRE", "k", "-5"])),
            Reply::integer(1)
        );
        assert_eq!(
            handler.execute(make_command(&["TTL", "k"])),
            Reply::integer(-2)
        );
        // Until the sweeper runs the value is still served
        assert_eq!(handler.execute(make_command(&["GET", "k"])), Reply::bulk("v"));
    }

    #[test]
    fn test_ttl_missing_key() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["TTL", "nope"])),
            Reply::integer(-2)
        );
    }

    #[test]
    fn test_ttl_counts_down() {
        let handler = create_handler();
        handler.execute(make_command(&["SET", "k", "v"]));
        handler.execute(make_command(&["EXPIRE", "k", "1"]));

        std::thread::sleep(Duration::from_millis(1050));
        assert_eq!(
            handler.execute(make_command(&["TTL", "k"])),
            Reply::integer(-2)
        );
    }

    #[test]
    fn test_empty_command() {
        let handler = create_handler();

        assert_eq!(handler.execute(vec![]), Reply::error("ERR empty command"));
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["flushall"])),
            Reply::error("ERR unknown command 'FLUSHALL'")
        );
    }

    #[test]
    fn test_binary_keys_and_values() {
        let handler = create_handler();
        let key = Bytes::from(&b"k\x00\xff"[..]);
        let value = Bytes::from(&b"\r\n\x00"[..]);

        let response =
            handler.execute(vec![Bytes::from("SET"), key.clone(), value.clone()]);
        assert_eq!(response, Reply::ok());

        let response = handler.execute(vec![Bytes::from("GET"), key]);
        assert_eq!(response, Reply::Bulk(Some(value)));
    }
}
