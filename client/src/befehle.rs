//! Bedienung ueber die Standardeingabe
//!
//! Eine Zeile pro Befehl:
//!
//! | Eingabe                 | Wirkung                              |
//! |-------------------------|--------------------------------------|
//! | `ptt` / `los`           | PTT druecken / loslassen             |
//! | `stumm` / `laut`        | Mikrofon stumm / aktiv               |
//! | `abo 118.300`           | Frequenz abonnieren                  |
//! | `ab 118.300`            | Abonnement beenden                   |
//! | `senden 118.300 121.9`  | Sendefrequenzen setzen (leer = keine)|
//! | `vol 118.300 0.5`       | Lautstaerke einer Frequenz           |
//! | `master 0.8`            | Master-Lautstaerke                   |
//! | `modus hold/toggle/vox` | PTT-Modus                            |
//! | `effekte 118.300 aus`   | Funk-Effekte einer Frequenz an/aus   |
//! | `direkt 118.300 DLH4CK an` | Sender ohne Effekte durchreichen  |
//! | `status`                | Telemetrie ausgeben                  |
//! | `ende`                  | Sitzung beenden                      |

use skyband_audio::PttMode;
use skyband_core::Callsign;
use skyband_voice::{Befehl, SessionHandle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::frequenz_parsen;

/// Eine geparste Eingabezeile
#[derive(Debug, Clone, PartialEq)]
pub enum Eingabe {
    Befehl(Befehl),
    Status,
    Ende,
}

/// Parst eine Zeile; `Ok(None)` fuer Leerzeilen
pub fn eingabe_parsen(zeile: &str) -> Result<Option<Eingabe>, String> {
    let mut teile = zeile.split_whitespace();
    let Some(wort) = teile.next() else {
        return Ok(None);
    };
    let argumente: Vec<&str> = teile.collect();

    let befehl = match (wort, argumente.as_slice()) {
        ("ptt", []) => Befehl::PttDruecken,
        ("los", []) => Befehl::PttLoslassen,
        ("stumm", []) => Befehl::Stumm(true),
        ("laut", []) => Befehl::Stumm(false),
        ("abo", [f]) => Befehl::Abonnieren(frequenz_parsen(f)?),
        ("ab", [f]) => Befehl::Abbestellen(frequenz_parsen(f)?),
        ("senden", fs) => Befehl::SendeFrequenzen(
            fs.iter()
                .map(|f| frequenz_parsen(f))
                .collect::<Result<_, _>>()?,
        ),
        ("vol", [f, w]) => Befehl::Lautstaerke(frequenz_parsen(f)?, wert_parsen(w)?),
        ("master", [w]) => Befehl::Master(wert_parsen(w)?),
        ("modus", [m]) => Befehl::PttModus(match *m {
            "hold" => PttMode::Hold,
            "toggle" => PttMode::Toggle,
            "vox" => PttMode::VoiceActivation,
            _ => return Err(format!("unbekannter PTT-Modus '{m}'")),
        }),
        ("effekte", [f, s]) => Befehl::Effekte(frequenz_parsen(f)?, schalter_parsen(s)?),
        ("direkt", [f, c, s]) => Befehl::Direkt(
            frequenz_parsen(f)?,
            Callsign::neu(*c).map_err(|e| e.to_string())?,
            schalter_parsen(s)?,
        ),
        ("status", []) => return Ok(Some(Eingabe::Status)),
        ("ende", []) => return Ok(Some(Eingabe::Ende)),
        _ => return Err(format!("unbekannter Befehl '{}'", zeile.trim())),
    };
    Ok(Some(Eingabe::Befehl(befehl)))
}

fn wert_parsen(text: &str) -> Result<f32, String> {
    text.parse::<f32>()
        .ok()
        .filter(|w| w.is_finite() && *w >= 0.0)
        .ok_or_else(|| format!("Lautstaerke '{text}' ungueltig"))
}

fn schalter_parsen(text: &str) -> Result<bool, String> {
    match text {
        "an" => Ok(true),
        "aus" => Ok(false),
        _ => Err(format!("'{text}' ist weder 'an' noch 'aus'")),
    }
}

/// Liest Befehle von stdin bis `ende`, EOF oder Abbruch
///
/// Das blockierende Lesen laeuft in einem eigenen Thread; er endet mit
/// dem Prozess.
pub async fn stdin_lesen(handle: SessionHandle, token: CancellationToken) {
    let (tx, mut zeilen) = mpsc::channel::<String>(16);
    let leser = std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for zeile in std::io::stdin().lines() {
                let Ok(zeile) = zeile else { break };
                if tx.blocking_send(zeile).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = leser {
        warn!(fehler = %e, "stdin-Thread nicht startbar");
        return;
    }

    loop {
        let zeile = tokio::select! {
            _ = token.cancelled() => break,
            z = zeilen.recv() => match z {
                Some(z) => z,
                None => break,
            },
        };
        match eingabe_parsen(&zeile) {
            Ok(None) => {}
            Ok(Some(Eingabe::Befehl(befehl))) => {
                if let Err(e) = handle.befehl(befehl) {
                    warn!(fehler = %e, "Befehl nicht angenommen");
                }
            }
            Ok(Some(Eingabe::Status)) => {
                info!(status = %handle.telemetrie().zusammenfassung(), sendet = handle.sendet(), "Status");
            }
            Ok(Some(Eingabe::Ende)) => {
                handle.beenden();
                break;
            }
            Err(e) => warn!("{e}"),
        }
    }
}
