use std::net::TcpListener;

use anyhow::Context;

/// Asks the OS for a free loopback ephemeral port, retrying while the answer
/// equals `previous`. A restarted engine must never collide with a prior
/// instance that has not fully released its listener yet.
pub fn allocate_loopback_port(previous: u16) -> anyhow::Result<u16> {
    for _ in 0..8 {
        let listener =
            TcpListener::bind(("127.0.0.1", 0)).context("bind ephemeral loopback port")?;
        let port = listener
            .local_addr()
            .context("read allocated loopback port")?
            .port();
        if port != previous {
            return Ok(port);
        }
    }
    anyhow::bail!("ephemeral allocator kept returning port {previous}");
}
