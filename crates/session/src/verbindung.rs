//! WebSocket-Verbindung zur Realtime-API
//!
//! Baut die Verbindung mit Auth-Headern auf und teilt den Stream in
//! eine Lese-Task (liefert [`TransportEreignis`]se an genau einen
//! Konsumenten) und eine Schreib-Task (bedient die Sende-Queue).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chatterbox_core::ChatterboxError;
use chatterbox_protocol::{SessionTransport, TransportEreignis};

use crate::error::{SessionError, SessionResult};

/// Verbindungsparameter
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Realtime-Endpunkt inkl. Modellparameter
    pub url: String,
    /// API-Schluessel (kommt aus der Umgebung, nie aus der Config-Datei)
    pub api_schluessel: String,
    /// Wert des OpenAI-Beta-Headers
    pub beta_header: String,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01"
                .to_string(),
            api_schluessel: String::new(),
            beta_header: "realtime=v1".to_string(),
        }
    }
}

/// Offene WebSocket-Verbindung
///
/// Klonbar; alle Klone teilen Sende-Queue und Lebenszyklus.
#[derive(Clone)]
pub struct WebSocketVerbindung {
    sende_tx: mpsc::Sender<String>,
    verbunden: Arc<AtomicBool>,
    token: CancellationToken,
}

impl WebSocketVerbindung {
    /// Baut die Verbindung auf und startet Lese- und Schreib-Task
    pub async fn verbinden(
        config: &WsConfig,
    ) -> SessionResult<(Self, mpsc::Receiver<TransportEreignis>)> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::Verbindung(format!("ungueltige URL: {e}")))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_schluessel))
            .map_err(|e| SessionError::Verbindung(format!("ungueltiger API-Schluessel: {e}")))?;
        let beta = HeaderValue::from_str(&config.beta_header)
            .map_err(|e| SessionError::Verbindung(format!("ungueltiger Beta-Header: {e}")))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", auth);
        headers.insert("OpenAI-Beta", beta);

        let (ws, _antwort) = connect_async(request)
            .await
            .map_err(|e| SessionError::Verbindung(e.to_string()))?;
        info!("WebSocket-Verbindung steht");

        let (mut schreiber, mut leser) = ws.split();
        let (ereignis_tx, ereignis_rx) = mpsc::channel::<TransportEreignis>(64);
        let (sende_tx, mut sende_rx) = mpsc::channel::<String>(64);
        let verbunden = Arc::new(AtomicBool::new(true));
        let token = CancellationToken::new();

        // Schreib-Task: bedient die Sende-Queue
        let schreib_token = token.clone();
        let schreib_ereignisse = ereignis_tx.clone();
        let schreib_verbunden = Arc::clone(&verbunden);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = schreib_token.cancelled() => break,
                    nachricht = sende_rx.recv() => {
                        let Some(text) = nachricht else { break };
                        if let Err(e) = schreiber.send(Message::Text(text)).await {
                            warn!(fehler = %e, "Senden fehlgeschlagen");
                            schreib_verbunden.store(false, Ordering::SeqCst);
                            let _ = schreib_ereignisse
                                .send(TransportEreignis::Fehler { meldung: e.to_string() })
                                .await;
                            schreib_token.cancel();
                            break;
                        }
                    }
                }
            }
            let _ = schreiber.close().await;
            debug!("Schreib-Task beendet");
        });

        // Lese-Task: reicht Server-Nachrichten an den Handler weiter
        let lese_token = token.clone();
        let lese_verbunden = Arc::clone(&verbunden);
        tokio::spawn(async move {
            let _ = ereignis_tx.send(TransportEreignis::Verbunden).await;
            let grund = loop {
                tokio::select! {
                    _ = lese_token.cancelled() => break "manuell getrennt".to_string(),
                    nachricht = leser.next() => match nachricht {
                        Some(Ok(Message::Text(text))) => {
                            let _ = ereignis_tx.send(TransportEreignis::Text(text)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "Gegenstelle hat geschlossen".to_string());
                        }
                        Some(Ok(_)) => {} // Ping/Pong/Binary ignorieren
                        Some(Err(e)) => {
                            let _ = ereignis_tx
                                .send(TransportEreignis::Fehler { meldung: e.to_string() })
                                .await;
                            break e.to_string();
                        }
                        None => break "Stream beendet".to_string(),
                    }
                }
            };
            lese_verbunden.store(false, Ordering::SeqCst);
            let _ = ereignis_tx.send(TransportEreignis::Getrennt { grund }).await;
            debug!("Lese-Task beendet");
        });

        Ok((
            Self {
                sende_tx,
                verbunden,
                token,
            },
            ereignis_rx,
        ))
    }

    /// Beendet die Verbindung; die Lese-Task meldet danach `Getrennt`
    pub fn trennen(&self) {
        self.verbunden.store(false, Ordering::SeqCst);
        self.token.cancel();
    }
}

impl SessionTransport for WebSocketVerbindung {
    fn senden(&self, text: String) -> chatterbox_core::Result<()> {
        if !self.verbunden.load(Ordering::SeqCst) {
            return Err(ChatterboxError::Getrennt(
                "WebSocket nicht verbunden".to_string(),
            ));
        }
        self.sende_tx
            .try_send(text)
            .map_err(|e| ChatterboxError::Transport(format!("Sende-Queue: {e}")))
    }

    fn ist_verbunden(&self) -> bool {
        self.verbunden.load(Ordering::SeqCst)
    }
}

/// Haelt die jeweils aktuelle Verbindung hinter dem Transport-Trait
///
/// Uplink und Handler behalten ueber Wiederverbindungen hinweg
/// dasselbe Transport-Handle; der Client tauscht nur den Inhalt.
#[derive(Default)]
pub struct TransportHalter {
    aktuell: RwLock<Option<WebSocketVerbindung>>,
}

impl TransportHalter {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn setzen(&self, verbindung: WebSocketVerbindung) {
        *self.aktuell.write() = Some(verbindung);
    }

    pub fn entfernen(&self) -> Option<WebSocketVerbindung> {
        self.aktuell.write().take()
    }
}

impl SessionTransport for TransportHalter {
    fn senden(&self, text: String) -> chatterbox_core::Result<()> {
        match self.aktuell.read().as_ref() {
            Some(verbindung) => verbindung.senden(text),
            None => Err(ChatterboxError::Getrennt(
                "keine aktive Verbindung".to_string(),
            )),
        }
    }

    fn ist_verbunden(&self) -> bool {
        self.aktuell
            .read()
            .as_ref()
            .map(|v| v.ist_verbunden())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn testserver() -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut empfangen = Vec::new();
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                empfangen.push(text.clone());
                ws.send(Message::Text(format!("echo:{text}"))).await.unwrap();
            }
            ws.close(None).await.ok();
            empfangen
        });
        (format!("ws://{addr}/"), handle)
    }

    fn config(url: String) -> WsConfig {
        WsConfig {
            url,
            api_schluessel: "test-schluessel".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn senden_und_empfangen() {
        let (url, server) = testserver().await;
        let (verbindung, mut rx) = WebSocketVerbindung::verbinden(&config(url)).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            TransportEreignis::Verbunden
        ));
        assert!(verbindung.ist_verbunden());

        verbindung.senden("hallo".to_string()).unwrap();

        match rx.recv().await.unwrap() {
            TransportEreignis::Text(text) => assert_eq!(text, "echo:hallo"),
            other => panic!("Text erwartet, war {other:?}"),
        }

        // Server schliesst, danach kommt Getrennt
        loop {
            match rx.recv().await {
                Some(TransportEreignis::Getrennt { .. }) | None => break,
                Some(_) => {}
            }
        }
        assert_eq!(server.await.unwrap(), vec!["hallo".to_string()]);
    }

    #[tokio::test]
    async fn trennen_beendet_die_verbindung() {
        let (url, _server) = testserver().await;
        let (verbindung, mut rx) = WebSocketVerbindung::verbinden(&config(url)).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            TransportEreignis::Verbunden
        ));

        verbindung.trennen();
        assert!(!verbindung.ist_verbunden());
        assert!(verbindung.senden("x".to_string()).is_err());

        loop {
            match rx.recv().await {
                Some(TransportEreignis::Getrennt { .. }) | None => break,
                Some(_) => {}
            }
        }
    }

    #[tokio::test]
    async fn halter_ohne_verbindung_meldet_getrennt() {
        let halter = TransportHalter::neu();
        assert!(!halter.ist_verbunden());
        let err = halter.senden("x".to_string()).unwrap_err();
        assert!(matches!(err, ChatterboxError::Getrennt(_)));
    }

    #[tokio::test]
    async fn halter_delegiert_an_aktive_verbindung() {
        let (url, server) = testserver().await;
        let (verbindung, mut rx) = WebSocketVerbindung::verbinden(&config(url)).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            TransportEreignis::Verbunden
        ));

        let halter = TransportHalter::neu();
        halter.setzen(verbindung);
        assert!(halter.ist_verbunden());
        halter.senden("ueber-halter".to_string()).unwrap();

        match rx.recv().await.unwrap() {
            TransportEreignis::Text(text) => assert_eq!(text, "echo:ueber-halter"),
            other => panic!("Text erwartet, war {other:?}"),
        }

        halter.entfernen();
        assert!(!halter.ist_verbunden());
        assert_eq!(server.await.unwrap(), vec!["ueber-halter".to_string()]);
    }
}
