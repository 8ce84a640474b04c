pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;

pub use lifecycle::{Daemon, DaemonConfig, LifecycleError, is_running, pid_file_path, running_pid, spawn_background, stop};
pub use protocol::{RpcError, RpcRequest, RpcResponse};
pub use registry::{EmbedderCache, ProjectCache};
pub use router::Router;
pub use server::{Client, Server, ServerError, ShutdownHandle, default_socket_path};
