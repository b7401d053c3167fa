/// Local programs spoken to over stdin and stdout.
pub mod command;
/// Prompt echo for dry runs.
pub mod echo;
/// Remote endpoints over HTTP.
pub mod http;

pub use command::CommandBackend;
pub use echo::EchoBackend;
pub use http::HttpBackend;
