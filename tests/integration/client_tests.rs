//! Integration tests for the typed telephony client.

use std::sync::{Arc, Mutex};

use futures_lite::future::{self, block_on};
use rilbridge::clock::MonotonicClock;
use rilbridge::error::{CallError, PayloadError};
use rilbridge::ril::messages::{RequestType, Status, error_code};
use rilbridge::ril::overrides::DeviceVariant;
use rilbridge::ril::payload::{
    self, NetworkScan, OperatorState, SignalStrength, SubscriptionStatus, UiccSubscription,
};
use rilbridge::ril::transport::MemoryTransport;
use rilbridge::{Bridge, BridgeConfig, TelephonyClient};

use crate::mock_modem::{MockModem, wait_until};

const REPORT: SignalStrength = SignalStrength {
    gsm_signal_strength: 18,
    gsm_bit_error_rate: 0,
    lte_signal_strength: 25,
    lte_rsrp: 95,
    lte_rsrq: 8,
    lte_rssnr: 120,
};

fn bridge(config: BridgeConfig) -> (Bridge<MemoryTransport>, MockModem) {
    let (modem, transport) = MockModem::new();
    modem.announce(10);
    let config = BridgeConfig {
        poll_interval_ms: 1,
        ..config
    };
    let b = Bridge::start(config, transport, Arc::new(MonotonicClock::new())).unwrap();
    (b, modem)
}

#[test]
fn signal_strength_is_decoded() {
    let (b, modem) = bridge(BridgeConfig::default());
    let body = payload::encode(&REPORT).unwrap();
    let _server = modem.serve(move |req| {
        assert_eq!(req.request_type, RequestType::SignalStrength);
        Some((Status::Ok, body.clone()))
    });

    assert_eq!(block_on(b.client().signal_strength()), Ok(REPORT));
}

#[test]
fn radio_power_sends_its_payload() {
    let (b, modem) = bridge(BridgeConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let _server = modem.serve(move |req| {
        s.lock().unwrap().push(req.payload.clone());
        Some((Status::Ok, Vec::new()))
    });

    block_on(b.client().set_radio_power(false)).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![vec![0]]);
}

#[test]
fn modem_error_becomes_call_error() {
    let (b, modem) = bridge(BridgeConfig::default());
    let _server = modem.serve(|_| Some((Status::Error(error_code::GENERIC_FAILURE), Vec::new())));

    assert_eq!(
        block_on(b.client().baseband_version()),
        Err(CallError::Status(Status::Error(error_code::GENERIC_FAILURE)))
    );
}

#[test]
fn malformed_response_payload_is_reported() {
    let (b, modem) = bridge(BridgeConfig::default());
    let _server = modem.serve(|_| Some((Status::Ok, vec![1, 2])));

    assert_eq!(
        block_on(b.client().signal_strength()),
        Err(CallError::Payload(PayloadError::Decode))
    );
}

#[test]
fn zenfone2_subscription_calls_never_reach_the_modem() {
    let config = BridgeConfig {
        device: DeviceVariant::Zenfone2,
        ..BridgeConfig::default()
    };
    let (b, modem) = bridge(config);
    let client = b.client();

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let s = statuses.clone();
    client.on_subscription_status(move |st| s.lock().unwrap().push(st));

    block_on(client.set_uicc_subscription(UiccSubscription {
        slot_id: 1,
        app_index: 0,
        sub_id: 1,
        sub_status: 1,
    }))
    .unwrap();
    block_on(client.set_data_subscription()).unwrap();
    block_on(client.set_default_voice_sub(1)).unwrap();

    assert_eq!(*statuses.lock().unwrap(), vec![SubscriptionStatus::ENABLED]);
    assert_eq!(modem.bytes_written(), 0);
    assert_eq!(b.stats().synthesized, 3);
}

#[test]
fn signal_strength_events_are_decoded_for_listeners() {
    let (b, modem) = bridge(BridgeConfig::default());
    let client = b.client();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let r = reports.clone();
    let id = client.on_signal_strength(move |rep| r.lock().unwrap().push(rep));

    modem.event(
        rilbridge::ril::messages::EventType::SignalStrength,
        payload::encode(&REPORT).unwrap(),
    );
    assert!(wait_until(|| reports.lock().unwrap().len() == 1));
    assert_eq!(reports.lock().unwrap()[0], REPORT);
    assert!(client.unsubscribe(id));
}

#[test]
fn dropping_a_pending_call_cancels_it() {
    let (b, _modem) = bridge(BridgeConfig::default());
    let d = b.dispatcher().clone();

    let mut call = Box::pin(d.call(RequestType::GetSimStatus, Vec::new()));
    assert!(block_on(future::poll_once(&mut call)).is_none());
    assert_eq!(d.in_flight(), 1);

    drop(call);
    assert_eq!(d.in_flight(), 0);
    assert_eq!(d.stats().cancelled, 1);
}

#[test]
fn client_without_bridge_wraps_a_dispatcher() {
    let (b, modem) = bridge(BridgeConfig::default());
    let client = TelephonyClient::new(b.dispatcher().clone());
    let _server = modem.serve(|_| Some((Status::Ok, Vec::new())));
    assert_eq!(block_on(client.clone().set_default_voice_sub(0)), Ok(()));
}

fn scan_reply(fields: &[&str]) -> Vec<u8> {
    payload::encode(&NetworkScan {
        fields: fields.iter().map(|f| (*f).to_string()).collect(),
    })
    .unwrap()
}

#[test]
fn network_scan_uses_four_fields_per_network_by_default() {
    let (b, modem) = bridge(BridgeConfig::default());
    let body = scan_reply(&[
        "Vodafone", "VF", "26202", "available", //
        "Telekom", "TDG", "26201", "current",
    ]);
    let _server = modem.serve(move |req| {
        assert_eq!(req.request_type, RequestType::QueryAvailableNetworks);
        Some((Status::Ok, body.clone()))
    });

    let nets = block_on(b.client().available_networks()).unwrap();
    assert_eq!(nets.len(), 2);
    assert_eq!(nets[1].long_name, "Telekom");
    assert_eq!(nets[1].state, OperatorState::Current);
}

#[test]
fn zenfone2_network_scan_has_five_fields_per_network() {
    let config = BridgeConfig {
        device: DeviceVariant::Zenfone2,
        ..BridgeConfig::default()
    };
    let (b, modem) = bridge(config);
    let body = scan_reply(&[
        "Chunghwa", "CHT", "46692", "current", "9", //
        "FarEasTone", "FET", "46601", "available", "7",
    ]);
    let _server = modem.serve(move |_| Some((Status::Ok, body.clone())));

    let nets = block_on(b.client().available_networks()).unwrap();
    assert_eq!(nets.len(), 2);
    assert_eq!(nets[0].numeric, "46692");
    assert_eq!(nets[1].short_name, "FET");
    assert_eq!(nets[1].state, OperatorState::Available);
}

#[test]
fn generic_layout_from_zenfone2_modem_is_rejected() {
    let config = BridgeConfig {
        device: DeviceVariant::Zenfone2,
        ..BridgeConfig::default()
    };
    let (b, modem) = bridge(config);
    let body = scan_reply(&["Vodafone", "VF", "26202", "available"]);
    let _server = modem.serve(move |_| Some((Status::Ok, body.clone())));

    assert_eq!(
        block_on(b.client().available_networks()),
        Err(CallError::Payload(PayloadError::Decode))
    );
}
