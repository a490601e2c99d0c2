//! Fehlertypen fuer Skyband
//!
//! Zentraler Fehler-Enum der Voice-Engine. Die Varianten bilden die
//! Fehlerklassen ab, nach denen die Pipelines lokal reagieren:
//! nur `FatalSession` erreicht die besitzende Anwendung, alles andere
//! wird im Audio-Pfad durch Stille, Verdeckung oder Verwerfen abgefangen.

use thiserror::Error;

/// Globaler Result-Alias fuer Skyband
pub type Result<T> = std::result::Result<T, SkybandError>;

/// Alle moeglichen Fehler im Skyband-System
#[derive(Debug, Error)]
pub enum SkybandError {
    // --- Netzwerk ---
    /// Senden/Empfangen fehlgeschlagen, Sitzung laeuft weiter
    #[error("Voruebergehender Netzwerkfehler: {0}")]
    TransientNetwork(String),

    // --- Protokoll ---
    /// Paket nicht lesbar, wird verworfen
    #[error("Fehlerhaftes Paket: {0}")]
    MalformedPacket(String),

    // --- Audio ---
    /// Encode/Decode fehlgeschlagen, Verdeckungs-Frame wird eingesetzt
    #[error("Codec-Fehler: {0}")]
    Codec(String),

    // --- Ressourcen ---
    /// Zu viele verfolgte Quellen oder Frequenzen, Aeltestes wird verdraengt
    #[error("Ressourcen erschoepft: {0}")]
    ResourceExhaustion(String),

    // --- Sitzung ---
    /// Socket dauerhaft unbrauchbar, Pipelines werden abgebaut
    #[error("Sitzung abgebrochen: {0}")]
    FatalSession(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl SkybandError {
    /// Erstellt einen Sitzungsabbruch aus einer beliebigen Nachricht
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::FatalSession(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// Gibt true zurueck wenn der Fehler die Sitzung beendet
    ///
    /// Alle anderen Fehler werden lokal behandelt und duerfen den
    /// Audio-Takt nie unterbrechen.
    pub fn ist_fatal(&self) -> bool {
        matches!(self, Self::FatalSession(_))
    }
}

impl From<std::io::Error> for SkybandError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            // Lokale Adresse oder Berechtigung weg: der Socket wird nicht wieder brauchbar
            ErrorKind::AddrNotAvailable | ErrorKind::PermissionDenied | ErrorKind::AddrInUse => {
                Self::FatalSession(e.to_string())
            }
            _ => Self::TransientNetwork(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = SkybandError::Codec("Frame zu kurz".into());
        assert_eq!(e.to_string(), "Codec-Fehler: Frame zu kurz");
    }

    #[test]
    fn wiederholbar_erkennung() {
        assert!(SkybandError::TransientNetwork("test".into()).ist_wiederholbar());
        assert!(!SkybandError::MalformedPacket("test".into()).ist_wiederholbar());
        assert!(!SkybandError::fatal("test").ist_wiederholbar());
    }

    #[test]
    fn nur_sitzungsabbruch_ist_fatal() {
        assert!(SkybandError::fatal("socket weg").ist_fatal());
        assert!(!SkybandError::Codec("x".into()).ist_fatal());
        assert!(!SkybandError::ResourceExhaustion("x".into()).ist_fatal());
        assert!(!SkybandError::TransientNetwork("x".into()).ist_fatal());
    }

    #[test]
    fn io_fehler_klassifizierung() {
        let e: SkybandError = std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into();
        assert!(e.ist_wiederholbar());

        let e: SkybandError = std::io::Error::from(std::io::ErrorKind::AddrNotAvailable).into();
        assert!(e.ist_fatal());
    }
}
