//! Process-level defaults shared by the binary and the libraries.

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9999;

/// Name that selects server mode instead of a client display name.
pub const SERVER_NAME: &str = "server";

/// Default upper bound on a single frame's payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Server,
    Client { name: String },
}

impl Mode {
    pub fn from_name(name: &str) -> Self {
        if name == SERVER_NAME {
            Mode::Server
        } else {
            Mode::Client {
                name: name.to_string(),
            }
        }
    }
}

pub fn socket_addr(host: &str, port: u16) -> String {
    format!("{}:{}", host, port)
}
