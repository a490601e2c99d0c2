//! Datagramm-Transport zum Voice-Server
//!
//! Unzuverlaessiger, ungeordneter Datagramm-Kanal. Die Sitzung kennt nur
//! das `DatagramTransport` Trait; `UdpTransport` ist die Implementierung
//! ueber einen verbundenen tokio-UDP-Socket.

use std::net::SocketAddr;

use async_trait::async_trait;
use skyband_core::SkybandError;
use tokio::net::UdpSocket;

/// Empfangspuffer: groesstes Paket (Nutzdaten 1280 + Felder) plus Reserve
pub const DATAGRAMM_PUFFER: usize = 2048;

/// Datagramm-Kanal einer Sitzung (ein Socket pro Sitzung)
#[async_trait]
pub trait DatagramTransport: Send + Sync + 'static {
    /// Sendet ein Datagramm an den Server
    async fn senden(&self, daten: &[u8]) -> Result<(), SkybandError>;

    /// Wartet auf das naechste Datagramm, liefert die Laenge in `puffer`
    async fn empfangen(&self, puffer: &mut [u8]) -> Result<usize, SkybandError>;

    fn lokale_adresse(&self) -> Result<SocketAddr, SkybandError>;
}

// ---------------------------------------------------------------------------
// UdpTransport
// ---------------------------------------------------------------------------

/// UDP-Socket, verbunden mit genau einem Voice-Server
pub struct UdpTransport {
    socket: UdpSocket,
    server: SocketAddr,
}

impl UdpTransport {
    /// Bindet `bind` und verbindet mit `server`
    ///
    /// Der verbundene Socket verwirft Datagramme fremder Absender bereits
    /// im Kernel.
    pub async fn verbinden(bind: SocketAddr, server: SocketAddr) -> Result<Self, SkybandError> {
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| SkybandError::fatal(format!("Bind {bind} fehlgeschlagen: {e}")))?;
        socket
            .connect(server)
            .await
            .map_err(|e| SkybandError::fatal(format!("Verbindung zu {server} fehlgeschlagen: {e}")))?;
        tracing::info!(lokal = ?socket.local_addr().ok(), server = %server, "UDP-Transport verbunden");
        Ok(Self { socket, server })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn senden(&self, daten: &[u8]) -> Result<(), SkybandError> {
        let gesendet = self.socket.send(daten).await?;
        if gesendet != daten.len() {
            return Err(SkybandError::TransientNetwork(format!(
                "nur {gesendet} von {} Bytes gesendet",
                daten.len()
            )));
        }
        tracing::trace!(bytes = gesendet, server = %self.server, "Datagramm gesendet");
        Ok(())
    }

    async fn empfangen(&self, puffer: &mut [u8]) -> Result<usize, SkybandError> {
        Ok(self.socket.recv(puffer).await?)
    }

    fn lokale_adresse(&self) -> Result<SocketAddr, SkybandError> {
        Ok(self.socket.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn localhost(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[tokio::test]
    async fn transport_binden_und_senden() {
        let server = UdpSocket::bind(localhost(0)).await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let transport = UdpTransport::verbinden(localhost(0), server_addr)
            .await
            .expect("Transport muss binden koennen");
        let lokal = transport.lokale_adresse().unwrap();
        assert_ne!(lokal.port(), 0, "OS muss einen Port zuweisen");

        transport.senden(b"hallo").await.unwrap();
        let mut buf = [0u8; 64];
        let (len, von) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hallo");
        assert_eq!(von, lokal);

        server.send_to(b"zurueck", lokal).await.unwrap();
        let len = transport.empfangen(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"zurueck");
    }
}
