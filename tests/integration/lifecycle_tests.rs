//! Integration tests for bridge start-up, link loss, reconnect and
//! shutdown.

use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::sync::Arc;

use futures_lite::future::block_on;
use rilbridge::clock::MonotonicClock;
use rilbridge::error::{ChannelError, ConfigError, Error};
use rilbridge::ril::codec::{self, FrameDecoder};
use rilbridge::ril::messages::{
    EventType, RequestState, RequestType, Response, Status, UnsolicitedEvent,
};
use rilbridge::ril::payload::{self, BasebandVersion, RilConnected};
use rilbridge::ril::transport::MemoryTransport;
use rilbridge::{Bridge, BridgeConfig};

use crate::mock_modem::{Completions, MockModem, recorder, wait_until};

fn fast_config() -> BridgeConfig {
    BridgeConfig {
        handshake_timeout_ms: 200,
        poll_interval_ms: 1,
        sweep_interval_ms: 20,
        ..BridgeConfig::default()
    }
}

fn started(config: BridgeConfig) -> (Bridge<MemoryTransport>, MockModem) {
    let (modem, transport) = MockModem::new();
    modem.announce(10);
    let bridge = Bridge::start(config, transport, Arc::new(MonotonicClock::new())).unwrap();
    (bridge, modem)
}

#[test]
fn bridge_comes_up_after_handshake() {
    let (bridge, modem) = started(fast_config());
    assert!(bridge.is_connected());

    let baseband = payload::encode(&BasebandVersion {
        version: "Z00A-WW_2.20".into(),
    })
    .unwrap();
    let _server = modem.serve(move |_| Some((Status::Ok, baseband.clone())));

    let version = block_on(bridge.client().baseband_version()).unwrap();
    assert_eq!(version, "Z00A-WW_2.20");
}

#[test]
fn old_modem_is_refused() {
    let (modem, transport) = MockModem::new();
    modem.announce(3);
    let err = Bridge::start(fast_config(), transport, Arc::new(MonotonicClock::new())).err();
    assert_eq!(
        err,
        Some(Error::Channel(ChannelError::VersionMismatch { got: 3, min: 6 }))
    );
    assert!(!modem.is_open());
}

#[test]
fn silent_modem_times_out() {
    let (_modem, transport) = MockModem::new();
    let err = Bridge::start(fast_config(), transport, Arc::new(MonotonicClock::new())).err();
    assert_eq!(err, Some(Error::Channel(ChannelError::HandshakeTimeout)));
}

#[test]
fn invalid_config_is_rejected_before_connecting() {
    let config = BridgeConfig {
        poll_interval_ms: 0,
        ..BridgeConfig::default()
    };
    let err = Bridge::<MemoryTransport>::new(config, Arc::new(MonotonicClock::new())).err();
    assert!(matches!(err, Some(Error::Config(ConfigError::Invalid(_)))));
}

#[test]
fn link_loss_fails_every_request_in_flight() {
    let (bridge, modem) = started(fast_config());
    let d = bridge.dispatcher().clone();
    let log = Completions::default();

    for _ in 0..5 {
        d.submit(RequestType::GetCurrentCalls, vec![], recorder(&log));
    }
    assert_eq!(d.in_flight(), 5);

    modem.hang_up();
    assert!(wait_until(|| log.lock().unwrap().len() == 5));
    {
        let log = log.lock().unwrap();
        assert!(log.iter().all(|c| c.status == Status::TransportLost));
        assert!(log.iter().all(|c| c.state == RequestState::Failed));
    }
    assert!(!bridge.is_connected());

    // Stays down until reattached.
    let late = Completions::default();
    d.submit(RequestType::SignalStrength, vec![], recorder(&late));
    assert_eq!(late.lock().unwrap()[0].status, Status::TransportLost);
    assert_eq!(bridge.stats().failed, 6);
}

#[test]
fn reconnect_restores_service() {
    let (mut bridge, old) = started(fast_config());
    old.hang_up();
    assert!(wait_until(|| !bridge.is_connected()));

    let (modem, transport) = MockModem::new();
    modem.announce(12);
    assert_eq!(bridge.reconnect(transport).unwrap(), 12);
    assert!(bridge.is_connected());

    let _server = modem.serve(|_| Some((Status::Ok, vec![7])));
    let c = bridge
        .dispatcher()
        .call_blocking(RequestType::Operator, Vec::new());
    assert_eq!(c.status, Status::Ok);
    assert_eq!(c.payload, vec![7]);
}

#[test]
fn events_after_reconnect_still_reach_old_subscribers() {
    let (mut bridge, old) = started(fast_config());
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let s = seen.clone();
    bridge.dispatcher().subscribe(
        EventType::RadioStateChanged,
        Arc::new(move |e: &UnsolicitedEvent| s.lock().unwrap().push(e.payload.clone())),
    );
    old.hang_up();
    assert!(wait_until(|| !bridge.is_connected()));

    let (modem, transport) = MockModem::new();
    modem.announce(10);
    bridge.reconnect(transport).unwrap();
    modem.event(EventType::RadioStateChanged, vec![2]);

    assert!(wait_until(|| seen.lock().unwrap().len() == 1));
    assert_eq!(seen.lock().unwrap()[0], vec![2]);
}

#[test]
fn shutdown_fails_pending_and_closes_the_socket() {
    let (mut bridge, modem) = started(fast_config());
    let log = Completions::default();
    bridge
        .dispatcher()
        .submit(RequestType::BasebandVersion, vec![], recorder(&log));

    bridge.shutdown();
    assert_eq!(log.lock().unwrap()[0].status, Status::TransportLost);
    assert!(!modem.is_open());
    assert!(!bridge.is_connected());
}

#[test]
fn requests_time_out_through_the_reader_thread() {
    let config = BridgeConfig {
        request_timeout_ms: Some(50),
        sweep_interval_ms: 10,
        ..fast_config()
    };
    let (bridge, _modem) = started(config);
    let c = bridge
        .dispatcher()
        .call_blocking(RequestType::QueryAvailableNetworks, Vec::new());
    assert_eq!(c.status, Status::Timeout);
    assert_eq!(c.state, RequestState::TimedOut);
    assert_eq!(bridge.stats().timed_out, 1);
}

#[test]
fn connect_to_missing_socket_fails() {
    let config = BridgeConfig {
        socket_path: "/nonexistent/rilbridge/rild".into(),
        ..fast_config()
    };
    let err = Bridge::connect_unix(config, Arc::new(MonotonicClock::new())).err();
    assert!(matches!(err, Some(Error::Channel(ChannelError::Transport(_)))));
}

/// Minimal modem daemon on a real Unix socket: announces itself, then
/// answers every request with an empty OK until the bridge hangs up.
fn run_socket_modem(listener: UnixListener) {
    let (mut stream, _) = listener.accept().unwrap();
    let hello = payload::encode(&RilConnected { version: 9 }).unwrap();
    let frame =
        codec::encode_unsolicited(&UnsolicitedEvent::new(EventType::RilConnected, hello)).unwrap();
    stream.write_all(&frame).unwrap();

    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 256];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let mut replies = Vec::new();
        decoder
            .feed(&buf[..n], |body| {
                let req = codec::decode_request(body).unwrap();
                replies.push(
                    codec::encode_response(&Response {
                        token: req.token,
                        status: Status::Ok,
                        payload: Vec::new(),
                    })
                    .unwrap(),
                );
            })
            .unwrap();
        for reply in replies {
            if stream.write_all(&reply).is_err() {
                return;
            }
        }
    }
}

#[test]
fn unix_socket_end_to_end() {
    let path = std::env::temp_dir().join(format!("rilbridge-test-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).unwrap();
    let modem = std::thread::spawn(move || run_socket_modem(listener));

    let config = BridgeConfig {
        socket_path: path.to_string_lossy().into_owned(),
        ..fast_config()
    };
    let mut bridge = Bridge::connect_unix(config, Arc::new(MonotonicClock::new())).unwrap();

    block_on(bridge.client().set_radio_power(true)).unwrap();
    assert_eq!(bridge.stats().completed, 1);

    bridge.shutdown();
    modem.join().unwrap();
    let _ = std::fs::remove_file(&path);
}
