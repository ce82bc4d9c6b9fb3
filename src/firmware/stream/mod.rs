mod auth;
mod machine;
mod multipart;
mod server;
mod session;
#[cfg(test)]
mod tests;

pub(crate) use server::{request_shutdown, run_stream_server};
