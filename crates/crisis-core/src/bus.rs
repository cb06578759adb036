//! Wire codec between typed [`Message`]s and `(subject, payload)` pairs.
//!
//! Every transport (the in-process router and the NATS bridge) moves
//! messages through this codec, so both see the same subjects and JSON.

use crisis_types::{
    BedChart, FeatureBatch, FeatureUpdate, JobPayload, Layer, LoadCommand, Message,
    NextEventRequest, PowerStationCommand, SimStateReport, SimTimeMessage, Topic, Topics,
};
use serde::de::DeserializeOwned;

use crate::error::CoreError;

/// Encode a message as its subject and JSON payload.
///
/// # Errors
///
/// Returns [`CoreError::Payload`] if serialization fails.
pub fn encode(topics: &Topics, message: &Message) -> Result<(String, Vec<u8>), CoreError> {
    let subject = topics.subject(&message.topic());
    let payload = match message {
        Message::SimState(report) => serde_json::to_vec(report),
        Message::SimTime(time) => serde_json::to_vec(time),
        Message::Job(job) => serde_json::to_vec(job),
        Message::NextEvent(req) => serde_json::to_vec(req),
        Message::Load(_, cmd) => serde_json::to_vec(cmd),
        Message::PowerStationCmd(cmd) => serde_json::to_vec(cmd),
        Message::Layer(layer) => serde_json::to_vec(layer),
        Message::Feature(_, update) => serde_json::to_vec(update),
        Message::FeatureBatch(batch) => serde_json::to_vec(batch),
        Message::Chart(chart) => serde_json::to_vec(chart),
    }
    .map_err(|source| CoreError::Payload {
        subject: subject.clone(),
        source,
    })?;
    Ok((subject, payload))
}

/// Decode a payload received on `subject`.
///
/// Returns `Ok(None)` for subjects outside the known topic families and for
/// key channels other than the bed chart.
///
/// # Errors
///
/// Returns [`CoreError::Payload`] when the payload does not match the
/// topic's schema.
pub fn decode(topics: &Topics, subject: &str, payload: &[u8]) -> Result<Option<Message>, CoreError> {
    let Some(topic) = topics.parse(subject) else {
        return Ok(None);
    };
    if matches!(&topic, Topic::Key(key) if key != crisis_cascade::beds::CHART_KEY) {
        return Ok(None);
    }
    let message = match topic {
        Topic::SimState(_) => Message::SimState(json::<SimStateReport>(subject, payload)?),
        Topic::SimTime => Message::SimTime(json::<SimTimeMessage>(subject, payload)?),
        Topic::Job => Message::Job(json::<JobPayload>(subject, payload)?),
        Topic::NextEvent => Message::NextEvent(json::<NextEventRequest>(subject, payload)?),
        Topic::Load(kind) => Message::Load(kind, json::<LoadCommand>(subject, payload)?),
        Topic::PowerStationCmd => {
            Message::PowerStationCmd(json::<PowerStationCommand>(subject, payload)?)
        }
        Topic::Layer(id) => {
            let mut layer = json::<Layer>(subject, payload)?;
            if layer.id.is_empty() {
                layer.id = id;
            }
            Message::Layer(layer)
        }
        Topic::Feature(id) => Message::Feature(id, json::<FeatureUpdate>(subject, payload)?),
        Topic::FeatureBatch(id) => {
            let mut batch = json::<FeatureBatch>(subject, payload)?;
            if batch.layer_id.is_empty() {
                batch.layer_id = id;
            }
            Message::FeatureBatch(batch)
        }
        Topic::Key(key) => {
            let mut chart = json::<BedChart>(subject, payload)?;
            chart.id = key;
            Message::Chart(chart)
        }
    };
    Ok(Some(message))
}

fn json<T: DeserializeOwned>(subject: &str, payload: &[u8]) -> Result<T, CoreError> {
    serde_json::from_slice(payload).map_err(|source| CoreError::Payload {
        subject: subject.to_owned(),
        source,
    })
}
