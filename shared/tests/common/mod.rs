#![allow(dead_code)]

use std::collections::VecDeque;

use crux_core::testing::AppTester;
use crux_core::App as _;
use crux_http::http::StatusCode;
use crux_http::testing::ResponseBuilder;
use shared::capabilities::{
    AcquireOutcome, Acquisition, HttpResult, KeyValueOperation, LocalImage, MediaOperation,
    PermissionStatus,
};
use shared::shell::KvBackend;
use shared::{App, Effect, Event, FormConfig, MediaSource, Model, ViewModel};

pub const JPEG_BYTES: [u8; 12] = [
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01,
];

pub fn config() -> FormConfig {
    FormConfig::new(
        "user-1",
        "https://storage.example.com/object/incident-images",
        "https://api.example.com/incidents",
    )
    .with_auth_token("anon-key")
}

/// Drives the app the way a shell would, answering storage effects from a
/// real backend and handing every other effect back to the test.
pub struct Harness<B: KvBackend> {
    pub app: AppTester<App, Effect>,
    pub model: Model,
    pub backend: B,
}

impl<B: KvBackend> Harness<B> {
    pub fn new(backend: B) -> Self {
        Self {
            app: AppTester::default(),
            model: Model::default(),
            backend,
        }
    }

    /// A harness that has been started and hydrated from `backend`.
    pub fn started(backend: B) -> Self {
        let mut harness = Self::new(backend);
        let _ = harness.dispatch(Event::Start { config: config() });
        assert!(harness.model.hydrated, "draft load should have completed");
        harness
    }

    pub fn dispatch(&mut self, event: Event) -> Vec<Effect> {
        let update = self.app.update(event, &mut self.model);
        self.settle(update.effects)
    }

    pub fn view(&self) -> ViewModel {
        App.view(&self.model)
    }

    fn settle(&mut self, effects: Vec<Effect>) -> Vec<Effect> {
        let mut queue: VecDeque<Effect> = effects.into();
        let mut unhandled = Vec::new();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::KeyValue(request) => {
                    let result = Box::new(self.backend.execute(&request.operation));
                    let event = match &request.operation {
                        KeyValueOperation::Get { .. } => Event::DraftLoaded(result),
                        KeyValueOperation::Set { .. } => Event::DraftSaved(result),
                        KeyValueOperation::Delete { .. } => Event::DraftCleared(result),
                        other => panic!("core never issues {other:?}"),
                    };
                    let update = self.app.update(event, &mut self.model);
                    queue.extend(update.effects);
                }
                other => unhandled.push(other),
            }
        }

        unhandled
    }
}

/// What the shell would put on the wire.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SentRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub fn http_requests(effects: &[Effect]) -> Vec<SentRequest> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Http(request) => {
                let op = &request.operation;
                Some(SentRequest {
                    method: op.method.clone(),
                    url: op.url.clone(),
                    headers: op
                        .headers
                        .iter()
                        .map(|h| (h.name.clone(), h.value.clone()))
                        .collect(),
                    body: op.body.clone(),
                })
            }
            _ => None,
        })
        .collect()
}

pub fn media_operations(effects: &[Effect]) -> Vec<MediaOperation> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Media(request) => Some(request.operation.clone()),
            _ => None,
        })
        .collect()
}

pub fn response(status: u16) -> Box<HttpResult> {
    let status = StatusCode::try_from(status).expect("known status code");
    Box::new(Ok(ResponseBuilder::with_status(status)
        .body(Vec::new())
        .build()))
}

pub fn offline() -> Box<HttpResult> {
    Box::new(Err(crux_http::Error::Io("no route to host".into())))
}

pub fn selected(source: MediaSource, uri: &str) -> Event {
    Event::ImageAcquired {
        source,
        outcome: Box::new(AcquireOutcome {
            permission: Some(PermissionStatus::Granted),
            result: Ok(Acquisition::Selected(LocalImage::new(uri, 1200, 900))),
        }),
    }
}

pub fn json_body(request: &SentRequest) -> serde_json::Value {
    serde_json::from_slice(&request.body).expect("json body")
}
