//! Integration tests for the dispatch core over a framed channel.

use std::collections::HashSet;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rilbridge::BridgeConfig;
use rilbridge::clock::ManualClock;
use rilbridge::error::ChannelError;
use rilbridge::ril::channel::Channel;
use rilbridge::ril::codec::{self, FrameDecoder, HEADER_SIZE};
use rilbridge::ril::dispatch::Dispatcher;
use rilbridge::ril::events::EventListener;
use rilbridge::ril::io_task::{self, IoTiming};
use rilbridge::ril::messages::{
    EventType, RequestState, RequestType, Response, Status, UnsolicitedEvent, error_code,
};
use rilbridge::ril::transport::{MemoryTransport, Transport, UnixSocketTransport};

use crate::mock_modem::{Completions, MockModem, recorder};

fn attached(
    config: &BridgeConfig,
) -> (Dispatcher<MemoryTransport>, MockModem, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000));
    let d = Dispatcher::new(config, clock.clone());
    let (modem, transport) = MockModem::new();
    modem.announce(8);
    let chan = Channel::open_blocking(transport, 6, Duration::from_millis(200)).unwrap();
    d.attach(chan);
    (d, modem, clock)
}

#[test]
fn passthrough_delivers_exactly_what_the_modem_sent() {
    let (d, mut modem, _) = attached(&BridgeConfig::default());
    let log = Completions::default();

    let a = d.submit(RequestType::Operator, vec![], recorder(&log));
    let b = d.submit(RequestType::GetSimStatus, vec![1, 2], recorder(&log));

    let reqs = modem.requests();
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[1].payload, vec![1, 2]);

    // Answer out of order.
    modem.respond(b, Status::Error(error_code::RADIO_NOT_AVAILABLE), vec![]);
    modem.respond(a, Status::Ok, b"T-Mobile".to_vec());
    assert_eq!(d.poll_inbound(), Ok(2));

    let log = log.lock().unwrap();
    assert_eq!(log[0].token, b);
    assert_eq!(log[0].status, Status::Error(error_code::RADIO_NOT_AVAILABLE));
    assert_eq!(log[0].state, RequestState::Completed);
    assert_eq!(log[1].token, a);
    assert_eq!(log[1].payload, b"T-Mobile".to_vec());
    assert_eq!(d.stats().completed, 2);
}

#[test]
fn concurrent_submissions_yield_distinct_completions() {
    let (d, modem, _) = attached(&BridgeConfig::default());
    let d = Arc::new(d);
    let _server = modem.serve(|req| Some((Status::Ok, req.token.to_be_bytes().to_vec())));
    let reader = io_task::spawn(d.clone(), IoTiming::from_millis(1, 50)).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let d = d.clone();
            std::thread::spawn(move || {
                (0..16)
                    .map(|_| d.call_blocking(RequestType::SignalStrength, Vec::new()))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let completions: Vec<_> = workers
        .into_iter()
        .flat_map(|w| w.join().unwrap())
        .collect();

    assert_eq!(completions.len(), 64);
    let tokens: HashSet<_> = completions.iter().map(|c| c.token).collect();
    assert_eq!(tokens.len(), 64, "every completion has its own token");
    for c in &completions {
        assert_eq!(c.status, Status::Ok);
        assert_eq!(c.payload, c.token.to_be_bytes().to_vec(), "payload routed to its own caller");
    }

    d.transport_lost();
    reader.join().unwrap();
}

#[test]
fn modem_events_reach_subscribers_in_order() {
    let (d, modem, _) = attached(&BridgeConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));

    for tag in ["first", "second"] {
        let seen = seen.clone();
        let listener: Arc<dyn EventListener> = Arc::new(move |e: &UnsolicitedEvent| {
            seen.lock().unwrap().push((tag, e.payload[0]));
        });
        d.subscribe(EventType::RadioStateChanged, listener);
    }

    modem.event(EventType::RadioStateChanged, vec![10]);
    modem.event(EventType::CallStateChanged, vec![99]);
    modem.event(EventType::RadioStateChanged, vec![11]);
    assert_eq!(d.poll_inbound(), Ok(3));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("first", 10), ("second", 10), ("first", 11), ("second", 11)]
    );
    assert_eq!(d.stats().events_published, 3);
}

#[test]
fn undecodable_frame_is_skipped_without_losing_sync() {
    let (d, mut modem, _) = attached(&BridgeConfig::default());
    let log = Completions::default();
    let tok = d.submit(RequestType::BasebandVersion, vec![], recorder(&log));
    modem.requests();

    // Valid length prefix, unknown response tag.
    modem.inject_raw(&[0, 0, 0, 8, 0, 0, 0, 7, 0, 0, 0, 0]);
    // Unknown event code.
    modem.inject_raw(&[0, 0, 0, 8, 0, 0, 0, 1, 0, 0, 0x27, 0x0F]);
    modem.respond(tok, Status::Ok, vec![5]);

    assert_eq!(d.poll_inbound(), Ok(3));
    assert_eq!(d.stats().decode_errors, 2);
    assert_eq!(log.lock().unwrap()[0].payload, vec![5]);
    assert!(d.is_attached());
}

#[test]
fn bad_length_prefix_drops_the_link() {
    let (d, modem, _) = attached(&BridgeConfig::default());
    let log = Completions::default();
    d.submit(RequestType::Operator, vec![], recorder(&log));
    d.submit(RequestType::GetSimStatus, vec![], recorder(&log));

    modem.inject_raw(&[0x7F, 0xFF, 0xFF, 0xFF]);
    assert!(matches!(d.poll_inbound(), Err(ChannelError::Decode(_))));

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|c| c.status == Status::TransportLost));
    assert!(log.iter().all(|c| c.state == RequestState::Failed));
    assert!(!d.is_attached());
    assert!(!modem.is_open(), "channel closes its transport");
}

#[test]
fn deadline_fires_exactly_once_and_late_reply_is_stale() {
    let config = BridgeConfig {
        request_timeout_ms: Some(1_000),
        ..BridgeConfig::default()
    };
    let (d, modem, clock) = attached(&config);
    let log = Completions::default();
    let slow = d.submit(RequestType::QueryAvailableNetworks, vec![], recorder(&log));
    let forever = d.submit_with_timeout(RequestType::Operator, vec![], None, recorder(&log));

    clock.advance(999);
    assert_eq!(d.sweep_expired(), 0);
    clock.advance(1);
    assert_eq!(d.sweep_expired(), 1);
    clock.advance(60_000);
    assert_eq!(d.sweep_expired(), 0, "no deadline, never expires");

    modem.respond(slow, Status::Ok, vec![]);
    d.poll_inbound().unwrap();

    {
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].token, slow);
        assert_eq!(log[0].status, Status::Timeout);
        assert_eq!(log[0].state, RequestState::TimedOut);
    }
    assert_eq!(d.stats().stale_responses, 1);
    assert_eq!(d.request_state(forever), Some(RequestState::AwaitingResponse));
}

#[test]
fn cancelled_request_ignores_its_response() {
    let (d, modem, _) = attached(&BridgeConfig::default());
    let log = Completions::default();
    let tok = d.submit(RequestType::GetCurrentCalls, vec![], recorder(&log));

    assert!(d.cancel(tok));
    modem.respond(tok, Status::Ok, vec![1]);
    d.poll_inbound().unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].state, RequestState::Cancelled);
    assert_eq!(d.stats().cancelled, 1);
    assert_eq!(d.stats().stale_responses, 1);
}

#[test]
fn bytes_written_counts_whole_frames() {
    let (d, modem, _) = attached(&BridgeConfig::default());
    d.submit(RequestType::RadioPower, vec![1], |_| {});
    // 4 length + 4 code + 4 token + 1 payload
    assert_eq!(modem.bytes_written(), 13);
    assert_eq!(d.stats().bytes_written, 13);
}

/// Modem end of a socketpair that reads nothing until told to.
fn socket_link(
    config: &BridgeConfig,
) -> (Dispatcher<UnixSocketTransport>, UnixSocketTransport) {
    let (ours, theirs) = UnixStream::pair().unwrap();
    let d = Dispatcher::new(config, Arc::new(ManualClock::new(0)));
    d.attach(Channel::new(UnixSocketTransport::from_stream(ours).unwrap()));
    (d, UnixSocketTransport::from_stream(theirs).unwrap())
}

#[test]
fn slow_modem_backs_up_without_dropping_the_link() {
    const REQUESTS: usize = 40;
    const PAYLOAD: usize = 8000;
    let config = BridgeConfig {
        request_timeout_ms: None,
        ..BridgeConfig::default()
    };
    let (d, mut modem) = socket_link(&config);
    let log = Completions::default();

    for _ in 0..REQUESTS {
        d.submit(RequestType::GetSimStatus, vec![0xA5; PAYLOAD], recorder(&log));
    }
    assert!(d.is_attached(), "a full socket buffer is not a lost link");
    assert!(d.pending_output() > 0);
    assert_eq!(d.in_flight(), REQUESTS);
    assert!(log.lock().unwrap().is_empty());

    // The modem starts reading: every request arrives whole and in order.
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut tokens = Vec::new();
    for _ in 0..100_000 {
        d.flush_outbound().unwrap();
        let n = modem.read(&mut buf).unwrap();
        decoder
            .feed(&buf[..n], |body| {
                let req = codec::decode_request(body).unwrap();
                assert_eq!(req.payload.len(), PAYLOAD);
                tokens.push(req.token);
            })
            .unwrap();
        if tokens.len() == REQUESTS {
            break;
        }
    }
    assert_eq!(tokens.len(), REQUESTS);
    assert_eq!(d.pending_output(), 0);

    for token in tokens {
        let reply = codec::encode_response(&Response {
            token,
            status: Status::Ok,
            payload: Vec::new(),
        })
        .unwrap();
        assert_eq!(modem.write(&reply), Ok(reply.len()));
    }
    while d.in_flight() > 0 {
        d.poll_inbound().unwrap();
    }

    let log = log.lock().unwrap();
    assert_eq!(log.len(), REQUESTS);
    assert!(log.iter().all(|c| c.status == Status::Ok));
    let stats = d.stats();
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.bytes_written, (REQUESTS * (HEADER_SIZE + 8 + PAYLOAD)) as u64);
}

#[test]
fn modem_that_never_reads_gets_overloaded_not_disconnected() {
    let config = BridgeConfig {
        request_timeout_ms: None,
        ..BridgeConfig::default()
    };
    let (d, _modem) = socket_link(&config);
    let log = Completions::default();

    // Cancelling frees tracker slots, but queued frames still wait for
    // the modem, so the backlog cap is what stops this.
    let mut rejected = None;
    for _ in 0..1_000 {
        let token = d.submit(RequestType::GetSimStatus, vec![0; 8000], recorder(&log));
        if d.request_state(token).is_none() {
            rejected = Some(token);
            break;
        }
        d.cancel(token);
    }

    assert!(rejected.is_some(), "backlog cap was never reached");
    assert!(d.is_attached());
    let last = log.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.status, Status::Overloaded);
    assert_eq!(last.state, RequestState::Failed);
}
