//! Turmoil UDP sockets behind the session transport seam.

use std::{io, net::SocketAddr};

use echoprobe_core::{DatagramSocket, Transport};

/// Hands a session a socket bound inside the simulated network.
///
/// Turmoil binds asynchronously while the engine binds synchronously, so the
/// socket is bound up front with [`SimTransport::bind`] and handed out on the
/// first engine bind. Later binds fail, as does every bind on
/// [`SimTransport::unavailable`].
#[derive(Debug)]
pub struct SimTransport {
    socket: Option<turmoil::net::UdpSocket>,
}

impl SimTransport {
    /// Bind a simulated socket on `addr` for the next session.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = turmoil::net::UdpSocket::bind(addr).await?;
        Ok(Self { socket: Some(socket) })
    }

    /// Transport whose binds always fail.
    pub const fn unavailable() -> Self {
        Self { socket: None }
    }
}

impl Transport for SimTransport {
    type Socket = SimSocket;

    fn bind(&mut self, addr: SocketAddr) -> io::Result<SimSocket> {
        let socket = self.socket.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, format!("no simulated socket for {addr}"))
        })?;
        let local = socket.local_addr()?;
        if addr.port() != 0 && addr.port() != local.port() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("simulated socket is bound to {local}, not {addr}"),
            ));
        }
        Ok(SimSocket(socket))
    }
}

/// A Turmoil UDP socket.
#[derive(Debug)]
pub struct SimSocket(turmoil::net::UdpSocket);

impl DatagramSocket for SimSocket {
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.0.try_send_to(buf, target)
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.try_recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::{IpAddr, Ipv4Addr},
        time::Duration,
    };

    use super::*;

    const ANY: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);

    #[test]
    fn socket_is_handed_out_once() {
        let mut sim = turmoil::Builder::new().build();
        sim.client("client", async {
            let mut transport = SimTransport::bind(ANY).await?;
            let socket = transport.bind(ANY)?;
            assert_ne!(socket.local_addr()?.port(), 0);
            assert_eq!(
                transport.bind(ANY).expect_err("second bind").kind(),
                io::ErrorKind::AddrNotAvailable
            );
            Ok(())
        });
        sim.run().expect("simulation");
    }

    #[test]
    fn unavailable_transport_never_binds() {
        let err = SimTransport::unavailable().bind(ANY).expect_err("bind");
        assert_eq!(err.kind(), io::ErrorKind::AddrNotAvailable);
    }

    #[test]
    fn datagrams_cross_the_simulated_network() {
        let mut sim = turmoil::Builder::new().build();

        sim.host("server", || async {
            let socket = turmoil::net::UdpSocket::bind("0.0.0.0:9000").await?;
            let mut buf = [0u8; 64];
            loop {
                let (len, from) = socket.recv_from(&mut buf).await?;
                socket.send_to(&buf[..len], from).await?;
            }
        });

        sim.client("client", async {
            let socket = SimTransport::bind(ANY).await?.bind(ANY)?;
            let server = SocketAddr::new(turmoil::lookup("server"), 9000);
            let mut buf = [0u8; 64];

            assert_eq!(
                socket.try_recv_from(&mut buf).expect_err("nothing yet").kind(),
                io::ErrorKind::WouldBlock
            );
            socket.try_send_to(b"ping", server)?;

            let received = loop {
                match socket.try_recv_from(&mut buf) {
                    Ok(received) => break received,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    },
                    Err(e) => return Err(e.into()),
                }
            };
            assert_eq!(received, (4, server));
            assert_eq!(&buf[..4], b"ping");
            Ok(())
        });

        sim.run().expect("simulation");
    }
}
