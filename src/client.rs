//! Typed telephony client.
//!
//! The dispatcher speaks in request codes and opaque payload bytes. This
//! wrapper gives the host stack one method per operation, taking and
//! returning the payload structs from [`crate::ril::payload`].

use std::sync::Arc;

use log::warn;

use crate::error::CallError;
use crate::ril::dispatch::Dispatcher;
use crate::ril::events::SubscriptionId;
use crate::ril::messages::{EventType, RequestType, UnsolicitedEvent};
use crate::ril::payload::{
    self, AvailableNetwork, BasebandVersion, DefaultVoiceSub, RadioPower, SignalStrength,
    SubscriptionStatus, UiccSubscription,
};
use crate::ril::transport::Transport;

pub struct TelephonyClient<T: Transport> {
    dispatcher: Arc<Dispatcher<T>>,
}

impl<T: Transport> Clone for TelephonyClient<T> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<T: Transport> TelephonyClient<T> {
    pub fn new(dispatcher: Arc<Dispatcher<T>>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<T>> {
        &self.dispatcher
    }

    async fn request(
        &self,
        request_type: RequestType,
        body: Vec<u8>,
    ) -> Result<Vec<u8>, CallError> {
        let completion = self.dispatcher.call(request_type, body).await;
        if completion.status.is_ok() {
            Ok(completion.payload)
        } else {
            Err(CallError::Status(completion.status))
        }
    }

    pub async fn signal_strength(&self) -> Result<SignalStrength, CallError> {
        let bytes = self.request(RequestType::SignalStrength, Vec::new()).await?;
        Ok(payload::decode(&bytes)?)
    }

    pub async fn set_radio_power(&self, on: bool) -> Result<(), CallError> {
        let body = payload::encode(&RadioPower { on })?;
        self.request(RequestType::RadioPower, body).await.map(drop)
    }

    pub async fn baseband_version(&self) -> Result<String, CallError> {
        let bytes = self.request(RequestType::BasebandVersion, Vec::new()).await?;
        let v: BasebandVersion = payload::decode(&bytes)?;
        Ok(v.version)
    }

    /// Scan for networks. Records are split using the configured device's
    /// record length.
    pub async fn available_networks(&self) -> Result<Vec<AvailableNetwork>, CallError> {
        let bytes = self
            .request(RequestType::QueryAvailableNetworks, Vec::new())
            .await?;
        let per_network = self.dispatcher.device().network_record_len();
        Ok(payload::decode_available_networks(&bytes, per_network)?)
    }

    /// Activate or deactivate a SIM application.
    pub async fn set_uicc_subscription(&self, sub: UiccSubscription) -> Result<(), CallError> {
        let body = payload::encode(&sub)?;
        self.request(RequestType::SetUiccSubscription, body)
            .await
            .map(drop)
    }

    pub async fn set_data_subscription(&self) -> Result<(), CallError> {
        self.request(RequestType::SetDataSubscription, Vec::new())
            .await
            .map(drop)
    }

    pub async fn set_default_voice_sub(&self, sub_index: u32) -> Result<(), CallError> {
        let body = payload::encode(&DefaultVoiceSub { sub_index })?;
        self.request(RequestType::SetDefaultVoiceSub, body)
            .await
            .map(drop)
    }

    /// Call `f` with every subscription status change, modem-sent or
    /// synthesized. Malformed events are logged and skipped.
    pub fn on_subscription_status(
        &self,
        f: impl Fn(SubscriptionStatus) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.dispatcher.subscribe(
            EventType::SubscriptionStatusChanged,
            Arc::new(move |event: &UnsolicitedEvent| {
                match payload::decode::<SubscriptionStatus>(&event.payload) {
                    Ok(status) => f(status),
                    Err(e) => warn!("CLIENT: bad subscription status event: {}", e),
                }
            }),
        )
    }

    /// Call `f` with every unsolicited signal strength report.
    pub fn on_signal_strength(
        &self,
        f: impl Fn(SignalStrength) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.dispatcher.subscribe(
            EventType::SignalStrength,
            Arc::new(move |event: &UnsolicitedEvent| {
                match payload::decode::<SignalStrength>(&event.payload) {
                    Ok(report) => f(report),
                    Err(e) => warn!("CLIENT: bad signal strength event: {}", e),
                }
            }),
        )
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }
}
