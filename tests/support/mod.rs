use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_rustls::TlsAcceptor;

use backhaul::errors::GatewayError;
use backhaul::gateway::{LinkAcceptor, LinkSettings, SignalChannel};
use backhaul::net::pump::{BytePump, PumpOutcome, Transferred};
use backhaul::net::{Shutdown, ShutdownTrigger};
use backhaul::protocol::{SessionToken, parse_signal_line, token_line};
use backhaul::tls::{self, LinkConnector, ServerVerification};
use backhaul::{Admission, Gateway, GatewaySettings};

// -----------------------------------------------------------------------------
// ----- TLS -------------------------------------------------------------------

#[allow(dead_code)]
pub fn test_acceptor() -> TlsAcceptor {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = CertificateDer::from(generated.cert.der().to_vec());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(generated.key_pair.serialize_der()));

    tls::acceptor(vec![cert], key).expect("test tls identity")
}

#[allow(dead_code)]
pub fn insecure_connector() -> LinkConnector {
    LinkConnector::new(&ServerVerification::Insecure, "localhost")
        .expect("test tls connector")
        .with_handshake_timeout(Duration::from_secs(5))
}

#[allow(dead_code)]
pub fn link_settings() -> LinkSettings {
    LinkSettings {
        handshake_timeout: Duration::from_secs(2),
        accept_backoff: Duration::from_millis(100),
    }
}

// -----------------------------------------------------------------------------
// ----- CountingPump ----------------------------------------------------------

/// Stands in for the byte pump: holds both streams for `hold`, then reports
/// a graceful close. Tracks how many exchanges ran and the peak overlap.
#[derive(Clone, Debug, Default)]
pub struct CountingPump {
    hold: Duration,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl CountingPump {
    pub fn holding(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl BytePump for CountingPump {
    async fn exchange<A, B>(&self, a: A, b: B) -> PumpOutcome
    where
        A: AsyncRead + AsyncWrite + Unpin + Send,
        B: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        sleep(self.hold).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        drop((a, b));

        Ok(Transferred::default())
    }
}

// -----------------------------------------------------------------------------
// ----- MockRelay -------------------------------------------------------------

#[allow(dead_code)]
#[derive(Clone, Copy, Debug)]
pub enum DialBack {
    /// TLS dial-back with the right token, then echo every byte.
    Echo,
    /// Plain TCP dial-back that never speaks TLS.
    PlainText,
    /// TLS dial-back carrying a token nobody asked for.
    WrongToken,
}

#[derive(Clone, Debug, Default)]
pub struct MockRelay {
    signals: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[allow(dead_code)]
impl MockRelay {
    /// Open the control channel to `link_addr` and react to every signal.
    pub fn spawn(link_addr: SocketAddr, behaviour: DialBack) -> Self {
        let relay = MockRelay::default();
        let state = relay.clone();

        tokio::spawn(async move {
            let connector = insecure_connector();
            let control = connector
                .connect(&link_addr.to_string())
                .await
                .expect("control channel");

            let mut lines = BufReader::new(control).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let token = parse_signal_line(&line).expect("well-formed signal line");
                state.signals.fetch_add(1, Ordering::SeqCst);

                let state = state.clone();
                let connector = connector.clone();
                tokio::spawn(async move {
                    state.dial_back(behaviour, link_addr, token, &connector).await;
                });
            }
        });

        relay
    }

    pub fn signals(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }

    /// Everything each echo dial-back read before its stream ended.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().clone()
    }

    async fn dial_back(
        &self,
        behaviour: DialBack,
        link_addr: SocketAddr,
        token: SessionToken,
        connector: &LinkConnector,
    ) {
        match behaviour {
            DialBack::Echo => {
                let Ok(mut link) = connector.connect(&link_addr.to_string()).await else {
                    return;
                };
                link.write_all(token_line(&token).as_bytes()).await.unwrap();
                link.flush().await.unwrap();

                let mut seen = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    match link.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            seen.extend_from_slice(&buf[..n]);
                            if link.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                            let _ = link.flush().await;
                        }
                    }
                }
                let _ = link.shutdown().await;
                self.received.lock().push(seen);
            }

            DialBack::PlainText => {
                let Ok(mut link) = TcpStream::connect(link_addr).await else {
                    return;
                };
                let _ = link.write_all(format!("{token}\nhello\n").as_bytes()).await;
                let mut sink = Vec::new();
                let _ = link.read_to_end(&mut sink).await;
            }

            DialBack::WrongToken => {
                let Ok(mut link) = connector.connect(&link_addr.to_string()).await else {
                    return;
                };
                let forged = SessionToken::generate();
                let _ = link.write_all(token_line(&forged).as_bytes()).await;
                let _ = link.flush().await;
                let mut sink = Vec::new();
                let _ = link.read_to_end(&mut sink).await;
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Harness ---------------------------------------------------------------

pub struct Harness<P> {
    pub target_addr: SocketAddr,
    #[allow(dead_code)]
    pub link_addr: SocketAddr,
    #[allow(dead_code)]
    pub gateway: Arc<Gateway<P>>,
    trigger: ShutdownTrigger,
    serve: JoinHandle<Result<(), GatewayError>>,
}

#[allow(dead_code)]
impl<P: BytePump> Harness<P> {
    /// Gateway whose control channel is whatever stream the test hands in.
    pub async fn with_control<C>(
        control: C,
        admission: Admission,
        settings: GatewaySettings,
        pump: P,
    ) -> Self
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let link_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (trigger, shutdown) = backhaul::net::shutdown::channel();

        Self::start(control, link_listener, admission, settings, pump, trigger, shutdown).await
    }

    /// Gateway fed by a mock relay that connects over TLS like a real one.
    pub async fn with_relay(
        behaviour: DialBack,
        admission: Admission,
        settings: GatewaySettings,
        pump: P,
    ) -> (Self, MockRelay) {
        let link_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let link_addr = link_listener.local_addr().unwrap();
        let (trigger, mut shutdown) = backhaul::net::shutdown::channel();

        let relay = MockRelay::spawn(link_addr, behaviour);
        let acceptor = test_acceptor();
        let control = LinkAcceptor::accept_control(
            &link_listener,
            &acceptor,
            &link_settings(),
            &mut shutdown,
        )
        .await
        .expect("control channel");

        let harness =
            Self::start(control, link_listener, admission, settings, pump, trigger, shutdown).await;

        (harness, relay)
    }

    async fn start<C>(
        control: C,
        link_listener: TcpListener,
        admission: Admission,
        settings: GatewaySettings,
        pump: P,
        trigger: ShutdownTrigger,
        shutdown: Shutdown,
    ) -> Self
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let link_addr = link_listener.local_addr().unwrap();
        let signals = SignalChannel::spawn(control);
        let links = LinkAcceptor::spawn(
            link_listener,
            test_acceptor(),
            link_settings(),
            shutdown.clone(),
        );

        let target_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target_addr = target_listener.local_addr().unwrap();

        let gateway = Arc::new(Gateway::with_pump(links, signals, admission, settings, pump));
        let serving = gateway.clone();
        let serve = tokio::spawn(async move { serving.serve(target_listener, shutdown).await });

        Self {
            target_addr,
            link_addr,
            gateway,
            trigger,
            serve,
        }
    }

    pub async fn shutdown(self) {
        self.trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), self.serve)
            .await
            .expect("serve returns promptly after shutdown")
            .unwrap()
            .unwrap();
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

#[allow(dead_code)]
pub fn settings(capacity: usize, pair_timeout: Duration) -> GatewaySettings {
    GatewaySettings {
        capacity,
        pair_timeout,
        accept_backoff: Duration::from_secs(2),
    }
}

/// Poll `check` until it holds or `limit` runs out.
#[allow(dead_code)]
pub async fn wait_until<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Read until the peer closes; errors count as closed too.
#[allow(dead_code)]
pub async fn closed_within<S>(stream: &mut S, limit: Duration) -> bool
where
    S: AsyncRead + Unpin,
{
    let drain = async {
        let mut buf = [0u8; 256];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    };

    within(limit, drain).await
}

#[allow(dead_code)]
pub async fn within<F: Future>(limit: Duration, fut: F) -> bool {
    tokio::time::timeout(limit, fut).await.is_ok()
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
