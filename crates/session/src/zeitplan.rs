//! Abbrechbare Zeitplan-Aufgaben
//!
//! Verzoegert ausgefuehrte Arbeit (Wiederverbindung, Nachlauf nach der
//! Wiedergabe) als explizit abbrechbare Tasks statt loser verzoegerter
//! Closures.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Eine geplante, abbrechbare Aufgabe
///
/// Der Abbruch ist explizit; das Fallenlassen des Handles laesst die
/// Aufgabe weiterlaufen.
pub struct VerzoegerteAufgabe {
    token: CancellationToken,
}

impl VerzoegerteAufgabe {
    /// Fuehrt `zukunft` nach Ablauf der Verzoegerung aus, sofern bis
    /// dahin nicht abgebrochen wurde
    pub fn planen<Z>(verzoegerung: Duration, zukunft: Z) -> Self
    where
        Z: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let beobachtet = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = beobachtet.cancelled() => {}
                _ = tokio::time::sleep(verzoegerung) => {
                    zukunft.await;
                }
            }
        });
        Self { token }
    }

    /// Bricht die Aufgabe ab (Wirkung nur vor ihrem Start)
    pub fn abbrechen(&self) {
        self.token.cancel();
    }

    pub fn ist_abgebrochen(&self) -> bool {
        self.token.is_cancelled()
    }
}
