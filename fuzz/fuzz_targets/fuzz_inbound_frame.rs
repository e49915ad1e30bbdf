//! Fuzz target: `Dispatcher::on_inbound_frame`
//!
//! Feeds arbitrary frame bodies to a dispatcher with a few requests in
//! flight. Whatever arrives, each request completes at most once and the
//! tracker never grows.
//!
//! cargo fuzz run fuzz_inbound_frame

#![no_main]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use libfuzzer_sys::fuzz_target;
use rilbridge::BridgeConfig;
use rilbridge::clock::ManualClock;
use rilbridge::ril::channel::Channel;
use rilbridge::ril::dispatch::Dispatcher;
use rilbridge::ril::messages::RequestType;
use rilbridge::ril::transport::memory_pair;

fuzz_target!(|data: &[u8]| {
    let dispatcher = Dispatcher::new(&BridgeConfig::default(), Arc::new(ManualClock::new(0)));
    let (transport, _peer) = memory_pair();
    dispatcher.attach(Channel::new(transport));

    let completions = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        let c = completions.clone();
        dispatcher.submit(RequestType::Operator, Vec::new(), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
    }

    for body in data.split(|b| *b == 0xFF) {
        dispatcher.on_inbound_frame(body);
    }

    let done = completions.load(Ordering::SeqCst);
    assert!(done <= 4);
    assert_eq!(dispatcher.in_flight(), 4 - done);
});
