use tracing::{debug, error, info, warn};

use crate::capabilities::{
    storage_result, AcquireOutcome, Acquisition, Capabilities, Delivery, HttpResult, KvResult,
    MediaError, MediaSource, PermissionStatus,
};
use crate::config::FormConfig;
use crate::draft::DraftStore;
use crate::event::Event;
use crate::model::{
    FormStatus, ImageRef, Model, ReportDraft, Session, SubmissionAttempt, ToastKind, UploadState,
    UploadTicket,
};
use crate::{
    get_current_time_ms, submission, upload, AppError, ErrorKind, ImageView, Stage, ToastView,
    UploadStatusView, UserFacingError, ViewModel,
};

#[derive(Default)]
pub struct App;

impl App {
    fn start(config: FormConfig, model: &mut Model, caps: &Capabilities) {
        if let Err(e) = config.validate() {
            warn!(error = %e, "rejected form configuration");
            model.set_error(e.into());
            return;
        }
        let store = match DraftStore::for_owner(&config.owner_id) {
            Ok(store) => store,
            Err(e) => {
                model.set_error(e.into());
                return;
            }
        };

        caps.kv.get(store.key().raw(), |result| {
            Event::DraftLoaded(Box::new(storage_result(result)))
        });
        *model = Model::with_session(Session { config, store });

        Self::check_permissions(caps);
        info!("report form started");
    }

    fn check_permissions(caps: &Capabilities) {
        for source in [MediaSource::Camera, MediaSource::Library] {
            caps.media.check_permission(source, move |result| Event::PermissionChecked {
                source,
                result,
            });
        }
    }

    /// Writes the whole draft. Failures come back as `Event::DraftSaved`.
    fn persist(model: &mut Model, caps: &Capabilities) {
        let Some(session) = &model.session else {
            return;
        };
        match DraftStore::encode(&model.draft, get_current_time_ms()) {
            Ok(bytes) => caps.kv.set(session.store.key().raw(), bytes, |result| {
                Event::DraftSaved(Box::new(storage_result(result)))
            }),
            Err(e) => {
                warn!(error = %e, "could not encode draft");
                model.set_error(e.into());
            }
        }
    }

    fn clear_upload_error(model: &mut Model) {
        if model
            .active_error
            .as_ref()
            .is_some_and(|e| e.stage() == Some(Stage::Upload.as_str()))
        {
            model.clear_error();
        }
    }

    fn draft_loaded(result: KvResult, model: &mut Model, caps: &Capabilities) {
        model.hydrated = true;

        let loaded = match DraftStore::interpret_load(result) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(error = %e, "could not read stored draft");
                model.set_error(e.into());
                return;
            }
        };

        if model.status != FormStatus::Empty || !model.draft.is_empty() {
            debug!("keeping in-memory draft over stored draft");
            return;
        }
        if loaded.is_empty() {
            return;
        }

        model.draft = loaded;
        if let Err(e) = model.transition_to(FormStatus::Editing) {
            model.set_error(e.into());
            return;
        }
        info!(
            has_image = model.draft.image.is_some(),
            "restored stored draft"
        );

        if let Some(image) = model.draft.image.as_ref().filter(|image| !image.is_uploaded()) {
            let uri = image.local_uri.clone();
            caps.media
                .file_exists(uri.clone(), move |result| Event::LocalImageChecked { uri, result });
        }
    }

    fn local_image_checked(
        uri: &str,
        result: Result<bool, MediaError>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        match result {
            Ok(true) => {}
            Ok(false) => {
                let still_attached = model
                    .draft
                    .image
                    .as_ref()
                    .is_some_and(|image| image.local_uri == uri && !image.is_uploaded());
                if !still_attached {
                    return;
                }
                warn!("restored photo is no longer on the device");
                model.draft.image = None;
                model.upload = UploadState::Idle;
                Self::persist(model, caps);
                model.show_toast("The saved photo is no longer available", ToastKind::Warning);
            }
            Err(e) => debug!(error = %e, "could not check restored photo"),
        }
    }

    fn description_changed(text: String, model: &mut Model, caps: &Capabilities) {
        if let Err(e) = model.begin_edit() {
            warn!(status = %model.status, "edit rejected");
            model.set_error(e);
            return;
        }
        model.draft.description = text;
        model.clear_error_of(&[ErrorKind::Validation]);
        Self::persist(model, caps);
    }

    fn pick_image(source: MediaSource, model: &mut Model, caps: &Capabilities) {
        if let Some(current) = model.acquiring {
            warn!(
                requested = source.as_str(),
                in_progress = current.as_str(),
                "acquisition already in progress"
            );
            return;
        }
        if model.status == FormStatus::Submitting {
            model.set_error(AppError::new(
                ErrorKind::InvalidState,
                "Please wait until the report has been sent.",
            ));
            return;
        }
        let pick = match model.session() {
            Ok(session) => session.config.pick.clone(),
            Err(e) => {
                model.set_error(e);
                return;
            }
        };

        model.acquiring = Some(source);
        debug!(source = source.as_str(), "acquiring photo");
        caps.media.acquire(source, pick, move |outcome| Event::ImageAcquired {
            source,
            outcome: Box::new(outcome),
        });
    }

    fn image_acquired(
        source: MediaSource,
        outcome: AcquireOutcome,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        model.acquiring = None;
        let AcquireOutcome { permission, result } = outcome;
        if let Some(status) = permission {
            *model.permission_mut(source) = status.into();
        }

        match result {
            Ok(Acquisition::Cancelled) => debug!(source = source.as_str(), "picker cancelled"),
            Ok(Acquisition::Selected(image)) => {
                if let Err(e) = model.begin_edit() {
                    model.set_error(e);
                    return;
                }
                info!(
                    source = source.as_str(),
                    width = image.width,
                    height = image.height,
                    "photo selected"
                );
                model.draft.image = Some(ImageRef::local(image.uri));
                model.clear_error_of(&[ErrorKind::PermissionDenied, ErrorKind::MediaUnavailable]);
                Self::clear_upload_error(model);
                Self::persist(model, caps);
                Self::start_upload(model, caps);
            }
            Err(e) => {
                warn!(source = source.as_str(), error = %e, "photo acquisition failed");
                model.set_error(e.into());
            }
        }
    }

    /// Starts a fresh upload run for the current image, superseding any run in flight.
    fn start_upload(model: &mut Model, caps: &Capabilities) {
        let Some(image) = &model.draft.image else {
            return;
        };
        let Ok(session) = model.session() else {
            return;
        };
        let max_bytes = session.config.max_image_bytes;
        let ticket = UploadTicket::new(image.local_uri.clone());

        model.upload = UploadState::InFlight(ticket.clone());
        debug!(upload_id = %ticket.id, "reading photo for upload");
        caps.media
            .read_file(ticket.local_uri.clone(), max_bytes, move |result| {
                Event::UploadFileRead { ticket, result }
            });
    }

    fn fail_upload(model: &mut Model, error: AppError) {
        model.upload = UploadState::Failed { error: error.kind };
        model.set_error(error);
    }

    fn upload_file_read(
        ticket: UploadTicket,
        result: Result<Vec<u8>, MediaError>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        if !model.is_current_upload(&ticket) {
            debug!(upload_id = %ticket.id, "discarding superseded upload");
            return;
        }
        let Ok(session) = model.session() else {
            return;
        };

        let prepared = match result {
            Ok(bytes) => upload::prepare(&session.config, &bytes),
            Err(e) => Err(e.into()),
        };

        match prepared {
            Ok(prepared) => {
                debug!(
                    upload_id = %ticket.id,
                    bytes = prepared.body.len(),
                    "sending photo"
                );
                let mut builder = caps
                    .http
                    .post(prepared.url.as_str())
                    .header("Content-Type", prepared.content_type.as_str())
                    .body(prepared.body);

                if let Some(token) = &session.config.auth_token {
                    builder = builder.header("Authorization", &format!("Bearer {token}"));
                }

                let object_name = prepared.object_name;
                builder.send(move |result| Event::UploadResponse {
                    ticket,
                    object_name,
                    result: Box::new(result),
                });
            }
            Err(e) => {
                warn!(upload_id = %ticket.id, error = %e, "could not prepare upload");
                Self::fail_upload(model, e.into());
            }
        }
    }

    fn upload_response(
        ticket: &UploadTicket,
        object_name: &str,
        result: HttpResult,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        if !model.is_current_upload(ticket) {
            debug!(upload_id = %ticket.id, "discarding superseded upload response");
            return;
        }

        let outcome = upload::interpret(object_name, Delivery::from_result(result));
        if let Some(error) = outcome.app_error() {
            warn!(
                upload_id = %ticket.id,
                error = ?outcome.error,
                detail = outcome.detail.as_deref().unwrap_or_default(),
                "photo upload failed"
            );
            Self::fail_upload(model, error);
            return;
        }

        if let Some(image) = model.draft.image.as_mut() {
            image.remote_ref = outcome.remote_ref;
        }
        model.upload = UploadState::Idle;
        Self::clear_upload_error(model);
        info!(upload_id = %ticket.id, "photo uploaded");

        // Storage keeps the draft as it was at Submit. The next edit writes the reference.
        if model.status == FormStatus::Submitting {
            debug!(upload_id = %ticket.id, "holding remote reference until submission settles");
        } else {
            Self::persist(model, caps);
        }
        model.show_toast("Image uploaded", ToastKind::Success);
    }

    fn retry_upload(model: &mut Model, caps: &Capabilities) {
        let needs_upload = model
            .draft
            .image
            .as_ref()
            .is_some_and(|image| !image.is_uploaded());
        if !needs_upload || matches!(model.upload, UploadState::InFlight(_)) {
            debug!("no upload to retry");
            return;
        }
        Self::clear_upload_error(model);
        Self::start_upload(model, caps);
    }

    fn delete_image(model: &mut Model, caps: &Capabilities) {
        if model.draft.image.is_none() {
            return;
        }
        if let Err(e) = model.begin_edit() {
            model.set_error(e);
            return;
        }
        model.draft.image = None;
        model.upload = UploadState::Idle;
        Self::clear_upload_error(model);
        Self::persist(model, caps);
        model.show_toast("Image removed", ToastKind::Info);
    }

    fn submit(model: &mut Model, caps: &Capabilities) {
        if model.status == FormStatus::Submitting {
            warn!("submission already in flight");
            return;
        }
        if let Some(source) = model.acquiring {
            warn!(source = source.as_str(), "submit while a photo is being picked");
            model.set_error(AppError::new(
                ErrorKind::InvalidState,
                "Please finish adding the photo before sending the report.",
            ));
            return;
        }
        let session = match model.session() {
            Ok(session) => session,
            Err(e) => {
                model.set_error(e);
                return;
            }
        };
        let auth_token = session.config.auth_token.clone();
        let prepared = match submission::prepare(&session.config, &model.draft) {
            Ok(prepared) => prepared,
            Err(e) => {
                debug!(error = %e, "submission rejected before sending");
                model.set_error(e.into());
                return;
            }
        };

        if matches!(model.status, FormStatus::Empty | FormStatus::Failed) {
            if let Err(e) = model.transition_to(FormStatus::Editing) {
                model.set_error(e.into());
                return;
            }
        }
        if let Err(e) = model.transition_to(FormStatus::Submitting) {
            model.set_error(e.into());
            return;
        }

        let attempt = SubmissionAttempt::new();
        let attempt_id = attempt.id.clone();
        model.submission = Some(attempt);
        model.clear_error();

        info!(
            attempt_id = %attempt_id,
            has_image = model.draft.image.is_some(),
            image_uploaded = model.draft.image.as_ref().is_some_and(ImageRef::is_uploaded),
            "submitting report"
        );
        let mut builder = caps
            .http
            .post(prepared.url.as_str())
            .header("Content-Type", "application/json")
            .body(prepared.body);

        if let Some(token) = &auth_token {
            builder = builder.header("Authorization", &format!("Bearer {token}"));
        }

        builder.send(move |result| Event::SubmissionResponse {
            attempt_id,
            result: Box::new(result),
        });
    }

    fn submission_response(
        attempt_id: &str,
        result: HttpResult,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        let current = model.submission.as_ref().is_some_and(|a| a.id == attempt_id);
        if model.status != FormStatus::Submitting || !current {
            debug!(attempt_id, "discarding stale submission response");
            return;
        }
        let elapsed_ms = model
            .submission
            .take()
            .map(|a| get_current_time_ms().saturating_sub(a.started_at_ms));

        let outcome = submission::interpret(Delivery::from_result(result));
        if outcome.is_success() {
            if let Err(e) = model.transition_to(FormStatus::Submitted) {
                model.set_error(e.into());
                return;
            }
            model.draft = ReportDraft::default();
            model.upload = UploadState::Idle;
            if let Ok(session) = model.session() {
                caps.kv.delete(session.store.key().raw(), |result| {
                    Event::DraftCleared(Box::new(storage_result(result)))
                });
            }
            info!(attempt_id, status = ?outcome.status, elapsed_ms = ?elapsed_ms, "report submitted");
            model.show_toast("Report submitted", ToastKind::Success);
        } else {
            if let Err(e) = model.transition_to(FormStatus::Failed) {
                model.set_error(e.into());
                return;
            }
            warn!(
                attempt_id,
                status = ?outcome.status,
                error = ?outcome.error_kind,
                elapsed_ms = ?elapsed_ms,
                "report submission failed"
            );
            if let Some(error) = outcome.app_error() {
                model.set_error(error);
            }
        }
    }

    fn draft_saved(result: KvResult, model: &mut Model) {
        match DraftStore::interpret_save(result) {
            Ok(()) => {
                debug!("draft saved");
                model.clear_error_of(&[ErrorKind::Persistence]);
            }
            Err(e) => {
                error!(error = %e, "draft save failed");
                model.set_error(e.into());
            }
        }
    }

    fn draft_cleared(result: KvResult, model: &mut Model) {
        match DraftStore::interpret_clear(result) {
            Ok(existed) => debug!(existed, "stored draft cleared"),
            Err(e) => {
                error!(error = %e, "could not clear stored draft");
                model.set_error(e.into());
            }
        }
    }

    fn permission_checked(
        source: MediaSource,
        result: Result<PermissionStatus, MediaError>,
        model: &mut Model,
    ) {
        match result {
            Ok(status) => *model.permission_mut(source) = status.into(),
            Err(e) => debug!(source = source.as_str(), error = %e, "permission check failed"),
        }
    }

    fn image_view(model: &Model) -> Option<ImageView> {
        let image = model.draft.image.as_ref()?;
        let upload = if image.is_uploaded() {
            UploadStatusView::Uploaded
        } else {
            match model.upload {
                UploadState::Idle => UploadStatusView::NotUploaded,
                UploadState::InFlight(_) => UploadStatusView::Uploading,
                UploadState::Failed { .. } => UploadStatusView::Failed,
            }
        };
        Some(ImageView {
            local_uri: image.local_uri.clone(),
            remote_ref: image.remote_ref.clone(),
            upload,
        })
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        debug!(
            event = event.name(),
            user = event.is_user_initiated(),
            status = %model.status,
            "handling event"
        );

        match event {
            Event::Start { config } => Self::start(config, model, caps),
            Event::DescriptionChanged { text } => Self::description_changed(text, model, caps),
            Event::PickImage { source } => Self::pick_image(source, model, caps),
            Event::DeleteImage => Self::delete_image(model, caps),
            Event::RetryUpload => Self::retry_upload(model, caps),
            Event::Submit => Self::submit(model, caps),
            Event::NewReport => {
                if model.status == FormStatus::Submitted {
                    if let Err(e) = model.reset_report() {
                        model.set_error(e.into());
                    }
                } else {
                    debug!(status = %model.status, "new report ignored");
                }
            }
            Event::RefreshPermissions => Self::check_permissions(caps),
            Event::DismissError => model.clear_error(),
            Event::DismissToast => model.active_toast = None,

            Event::DraftLoaded(result) => Self::draft_loaded(*result, model, caps),
            Event::DraftSaved(result) => Self::draft_saved(*result, model),
            Event::DraftCleared(result) => Self::draft_cleared(*result, model),
            Event::LocalImageChecked { uri, result } => {
                Self::local_image_checked(&uri, result, model, caps);
            }
            Event::ImageAcquired { source, outcome } => {
                Self::image_acquired(source, *outcome, model, caps);
            }
            Event::PermissionChecked { source, result } => {
                Self::permission_checked(source, result, model);
            }
            Event::UploadFileRead { ticket, result } => {
                Self::upload_file_read(ticket, result, model, caps);
            }
            Event::UploadResponse {
                ticket,
                object_name,
                result,
            } => Self::upload_response(&ticket, &object_name, *result, model, caps),
            Event::SubmissionResponse { attempt_id, result } => {
                Self::submission_response(&attempt_id, *result, model, caps);
            }
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        let now_ms = get_current_time_ms();
        ViewModel {
            status: model.status,
            is_ready: model.session.is_some() && model.hydrated,
            description: model.draft.description.clone(),
            image: Self::image_view(model),
            can_submit: model.can_submit(),
            is_acquiring: model.acquiring.is_some(),
            is_submitting: model.status == FormStatus::Submitting,
            camera_permission: model.camera_permission,
            library_permission: model.library_permission,
            error: model.active_error.as_ref().map(UserFacingError::from),
            toast: model
                .active_toast
                .as_ref()
                .filter(|toast| !toast.is_expired(now_ms))
                .map(ToastView::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{KeyValueOperation, LocalImage, MediaOperation};
    use crate::Effect;
    use crux_core::testing::AppTester;
    use crux_core::App as _;
    use crux_http::http::StatusCode;
    use crux_http::testing::ResponseBuilder;

    fn config() -> FormConfig {
        FormConfig::new(
            "user-1",
            "https://storage.example.com/object/incident-images",
            "https://api.example.com/incidents",
        )
    }

    fn started() -> (AppTester<App, Effect>, Model) {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let _ = app.update(Event::Start { config: config() }, &mut model);
        let _ = app.update(
            Event::DraftLoaded(Box::new(Ok(None))),
            &mut model,
        );
        (app, model)
    }

    fn kv_ops(effects: &[Effect]) -> Vec<KeyValueOperation> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::KeyValue(request) => Some(request.operation.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(method, url)` of every HTTP request.
    fn http_ops(effects: &[Effect]) -> Vec<(String, String)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Http(request) => Some((
                    request.operation.method.clone(),
                    request.operation.url.clone(),
                )),
                _ => None,
            })
            .collect()
    }

    fn media_ops(effects: &[Effect]) -> Vec<MediaOperation> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Media(request) => Some(request.operation.clone()),
                _ => None,
            })
            .collect()
    }

    fn response(status: u16) -> Box<HttpResult> {
        let status = StatusCode::try_from(status).expect("known status code");
        Box::new(Ok(ResponseBuilder::with_status(status)
            .body(Vec::new())
            .build()))
    }

    fn selected(uri: &str) -> Event {
        Event::ImageAcquired {
            source: MediaSource::Camera,
            outcome: Box::new(AcquireOutcome {
                permission: Some(PermissionStatus::Granted),
                result: Ok(Acquisition::Selected(LocalImage::new(uri, 800, 600))),
            }),
        }
    }

    fn current_ticket(model: &Model) -> UploadTicket {
        match &model.upload {
            UploadState::InFlight(ticket) => ticket.clone(),
            other => panic!("expected upload in flight, got {other:?}"),
        }
    }

    #[test]
    fn start_loads_draft_and_checks_permissions() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let update = app.update(Event::Start { config: config() }, &mut model);

        assert!(model.session.is_some());
        assert!(!model.hydrated);
        assert!(matches!(
            kv_ops(&update.effects).as_slice(),
            [KeyValueOperation::Get { .. }]
        ));
        assert_eq!(
            media_ops(&update.effects)
                .iter()
                .filter(|op| matches!(op, MediaOperation::CheckPermission { .. }))
                .count(),
            2
        );
        assert!(update.effects.iter().any(|e| matches!(e, Effect::Render(_))));
    }

    #[test]
    fn invalid_config_is_reported_without_effects() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let mut bad = config();
        bad.owner_id = String::new();

        let update = app.update(Event::Start { config: bad }, &mut model);
        assert!(model.session.is_none());
        assert_eq!(
            model.active_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::Configuration)
        );
        assert!(kv_ops(&update.effects).is_empty());
    }

    #[test]
    fn stored_draft_is_restored() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let _ = app.update(Event::Start { config: config() }, &mut model);

        let stored = ReportDraft {
            description: "leaking pipe".into(),
            image: Some(ImageRef::local("file:///p.jpg")),
        };
        let bytes = DraftStore::encode(&stored, 0).unwrap();
        let update = app.update(Event::DraftLoaded(Box::new(Ok(Some(bytes)))), &mut model);

        assert!(model.hydrated);
        assert_eq!(model.status, FormStatus::Editing);
        assert_eq!(model.draft, stored);
        assert!(matches!(
            media_ops(&update.effects).as_slice(),
            [MediaOperation::FileExists { .. }]
        ));
    }

    #[test]
    fn missing_restored_photo_is_dropped() {
        let (app, mut model) = started();
        model.status = FormStatus::Editing;
        model.draft.description = "text".into();
        model.draft.image = Some(ImageRef::local("file:///gone.jpg"));

        let update = app.update(
            Event::LocalImageChecked {
                uri: "file:///gone.jpg".into(),
                result: Ok(false),
            },
            &mut model,
        );
        assert_eq!(model.draft.image, None);
        assert_eq!(model.draft.description, "text");
        assert!(matches!(
            kv_ops(&update.effects).as_slice(),
            [KeyValueOperation::Set { .. }]
        ));
        assert_eq!(
            model.active_toast.as_ref().map(|t| t.kind),
            Some(ToastKind::Warning)
        );
    }

    #[test]
    fn description_change_persists_and_enters_editing() {
        let (app, mut model) = started();
        let update = app.update(
            Event::DescriptionChanged {
                text: "broken glass".into(),
            },
            &mut model,
        );

        assert_eq!(model.status, FormStatus::Editing);
        assert_eq!(model.draft.description, "broken glass");
        let ops = kv_ops(&update.effects);
        let [KeyValueOperation::Set { value, .. }] = ops.as_slice() else {
            panic!("expected one write, got {ops:?}");
        };
        assert_eq!(DraftStore::decode(value).description, "broken glass");
    }

    #[test]
    fn edit_before_start_is_rejected() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let update = app.update(
            Event::DescriptionChanged { text: "x".into() },
            &mut model,
        );
        assert_eq!(model.draft.description, "");
        assert_eq!(
            model.active_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::InvalidState)
        );
        assert!(kv_ops(&update.effects).is_empty());
    }

    #[test]
    fn second_pick_while_acquiring_is_ignored() {
        let (app, mut model) = started();
        let first = app.update(
            Event::PickImage {
                source: MediaSource::Camera,
            },
            &mut model,
        );
        assert_eq!(model.acquiring, Some(MediaSource::Camera));
        assert!(matches!(
            media_ops(&first.effects).as_slice(),
            [MediaOperation::RequestPermission {
                source: MediaSource::Camera
            }]
        ));

        let second = app.update(
            Event::PickImage {
                source: MediaSource::Library,
            },
            &mut model,
        );
        assert!(media_ops(&second.effects).is_empty());
        assert_eq!(model.acquiring, Some(MediaSource::Camera));
    }

    #[test]
    fn selected_photo_is_saved_then_uploaded() {
        let (app, mut model) = started();
        model.acquiring = Some(MediaSource::Camera);

        let update = app.update(selected("file:///a.jpg"), &mut model);
        assert_eq!(model.acquiring, None);
        assert_eq!(model.status, FormStatus::Editing);
        assert_eq!(
            model.draft.image.as_ref().map(|i| i.local_uri.as_str()),
            Some("file:///a.jpg")
        );
        assert!(matches!(
            kv_ops(&update.effects).as_slice(),
            [KeyValueOperation::Set { .. }]
        ));
        assert!(matches!(
            media_ops(&update.effects).as_slice(),
            [MediaOperation::ReadFile { .. }]
        ));

        let ticket = current_ticket(&model);
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0, 1];
        let update = app.update(
            Event::UploadFileRead {
                ticket: ticket.clone(),
                result: Ok(jpeg),
            },
            &mut model,
        );
        let ops = http_ops(&update.effects);
        let [(method, url)] = ops.as_slice() else {
            panic!("expected one upload request, got {ops:?}");
        };
        assert_eq!(method, "POST");
        assert!(url.starts_with("https://storage.example.com/object/incident-images/user-1/"));

        let update = app.update(
            Event::UploadResponse {
                ticket,
                object_name: "user-1/abc.jpg".into(),
                result: response(200),
            },
            &mut model,
        );
        assert_eq!(model.upload, UploadState::Idle);
        assert_eq!(
            model.draft.image.as_ref().and_then(|i| i.remote_ref.as_deref()),
            Some("user-1/abc.jpg")
        );
        assert!(matches!(
            kv_ops(&update.effects).as_slice(),
            [KeyValueOperation::Set { .. }]
        ));
        assert_eq!(
            model.active_toast.as_ref().map(|t| t.message.as_str()),
            Some("Image uploaded")
        );
    }

    #[test]
    fn cancelled_pick_changes_nothing() {
        let (app, mut model) = started();
        model.acquiring = Some(MediaSource::Library);
        let update = app.update(
            Event::ImageAcquired {
                source: MediaSource::Library,
                outcome: Box::new(AcquireOutcome {
                    permission: Some(PermissionStatus::Granted),
                    result: Ok(Acquisition::Cancelled),
                }),
            },
            &mut model,
        );
        assert_eq!(model.status, FormStatus::Empty);
        assert_eq!(model.draft, ReportDraft::default());
        assert_eq!(model.acquiring, None);
        assert!(kv_ops(&update.effects).is_empty());
        assert!(model.active_error.is_none());
    }

    #[test]
    fn permission_denied_is_surfaced() {
        let (app, mut model) = started();
        let _ = app.update(
            Event::ImageAcquired {
                source: MediaSource::Camera,
                outcome: Box::new(AcquireOutcome {
                    permission: Some(PermissionStatus::Denied),
                    result: Err(MediaError::PermissionDenied {
                        media: MediaSource::Camera,
                        permanently: false,
                    }),
                }),
            },
            &mut model,
        );
        assert_eq!(
            model.camera_permission,
            crate::model::PermissionState::Denied
        );
        let error = model.active_error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::PermissionDenied);
        assert!(error.user_facing_message().contains("Camera"));
        assert_eq!(model.draft.image, None);
    }

    #[test]
    fn superseded_upload_result_is_discarded() {
        let (app, mut model) = started();
        let _ = app.update(selected("file:///first.jpg"), &mut model);
        let stale = current_ticket(&model);
        let _ = app.update(selected("file:///second.jpg"), &mut model);

        let update = app.update(
            Event::UploadResponse {
                ticket: stale,
                object_name: "user-1/first.jpg".into(),
                result: response(200),
            },
            &mut model,
        );
        assert!(kv_ops(&update.effects).is_empty());
        assert_eq!(
            model.draft.image,
            Some(ImageRef::local("file:///second.jpg"))
        );
        assert!(matches!(model.upload, UploadState::InFlight(_)));
    }

    #[test]
    fn failed_upload_keeps_local_image() {
        let (app, mut model) = started();
        let _ = app.update(selected("file:///a.jpg"), &mut model);
        let ticket = current_ticket(&model);

        let _ = app.update(
            Event::UploadResponse {
                ticket,
                object_name: "user-1/a.jpg".into(),
                result: response(500),
            },
            &mut model,
        );
        assert_eq!(model.draft.image, Some(ImageRef::local("file:///a.jpg")));
        assert_eq!(
            model.upload,
            UploadState::Failed {
                error: ErrorKind::UploadFailed
            }
        );
        assert_eq!(model.status, FormStatus::Editing);
        assert_eq!(
            App.view(&model).image.map(|i| i.upload),
            Some(UploadStatusView::Failed)
        );

        let update = app.update(Event::RetryUpload, &mut model);
        assert!(matches!(
            media_ops(&update.effects).as_slice(),
            [MediaOperation::ReadFile { .. }]
        ));
        assert!(model.active_error.is_none());
    }

    #[test]
    fn delete_image_makes_no_network_call() {
        let (app, mut model) = started();
        model.status = FormStatus::Editing;
        model.draft.image = Some(ImageRef {
            local_uri: "file:///a.jpg".into(),
            remote_ref: Some("user-1/a.jpg".into()),
        });

        let update = app.update(Event::DeleteImage, &mut model);
        assert_eq!(model.draft.image, None);
        assert!(http_ops(&update.effects).is_empty());
        assert!(matches!(
            kv_ops(&update.effects).as_slice(),
            [KeyValueOperation::Set { .. }]
        ));
        assert_eq!(
            model.active_toast.as_ref().map(|t| t.message.as_str()),
            Some("Image removed")
        );
    }

    #[test]
    fn empty_description_blocks_submit() {
        let (app, mut model) = started();
        let _ = app.update(
            Event::DescriptionChanged {
                text: "   ".into(),
            },
            &mut model,
        );
        let update = app.update(Event::Submit, &mut model);

        assert!(http_ops(&update.effects).is_empty());
        assert_eq!(model.status, FormStatus::Editing);
        let error = model.active_error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.user_facing_message(), "Please describe the incident.");
    }

    #[test]
    fn successful_submit_clears_draft() {
        let (app, mut model) = started();
        let _ = app.update(
            Event::DescriptionChanged {
                text: "fallen tree".into(),
            },
            &mut model,
        );
        let update = app.update(Event::Submit, &mut model);
        assert_eq!(model.status, FormStatus::Submitting);
        assert_eq!(http_ops(&update.effects).len(), 1);

        let attempt_id = model.submission.as_ref().unwrap().id.clone();
        let update = app.update(
            Event::SubmissionResponse {
                attempt_id,
                result: response(201),
            },
            &mut model,
        );
        assert_eq!(model.status, FormStatus::Submitted);
        assert_eq!(model.draft, ReportDraft::default());
        assert!(matches!(
            kv_ops(&update.effects).as_slice(),
            [KeyValueOperation::Delete { .. }]
        ));

        let _ = app.update(Event::NewReport, &mut model);
        assert_eq!(model.status, FormStatus::Empty);
    }

    #[test]
    fn failed_submit_keeps_draft_and_allows_retry() {
        let (app, mut model) = started();
        let _ = app.update(
            Event::DescriptionChanged {
                text: "fallen tree".into(),
            },
            &mut model,
        );
        let _ = app.update(Event::Submit, &mut model);
        let attempt_id = model.submission.as_ref().unwrap().id.clone();

        let update = app.update(
            Event::SubmissionResponse {
                attempt_id,
                result: Box::new(Err(crux_http::Error::Io("airplane mode".into()))),
            },
            &mut model,
        );
        assert_eq!(model.status, FormStatus::Failed);
        assert_eq!(model.draft.description, "fallen tree");
        assert!(kv_ops(&update.effects).is_empty());
        assert_eq!(
            model.active_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::NetworkUnavailable)
        );

        let update = app.update(Event::Submit, &mut model);
        assert_eq!(model.status, FormStatus::Submitting);
        assert_eq!(http_ops(&update.effects).len(), 1);
    }

    #[test]
    fn submit_while_picking_keeps_the_pick() {
        let (app, mut model) = started();
        let _ = app.update(
            Event::DescriptionChanged { text: "x".into() },
            &mut model,
        );
        let _ = app.update(
            Event::PickImage {
                source: MediaSource::Library,
            },
            &mut model,
        );

        let update = app.update(Event::Submit, &mut model);
        assert!(http_ops(&update.effects).is_empty());
        assert_eq!(model.status, FormStatus::Editing);
        assert_eq!(
            model.active_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::InvalidState)
        );

        let _ = app.update(selected("file:///late.jpg"), &mut model);
        assert_eq!(model.draft.image, Some(ImageRef::local("file:///late.jpg")));
    }

    #[test]
    fn double_submit_sends_once() {
        let (app, mut model) = started();
        let _ = app.update(
            Event::DescriptionChanged { text: "x".into() },
            &mut model,
        );
        let first = app.update(Event::Submit, &mut model);
        let second = app.update(Event::Submit, &mut model);
        assert_eq!(http_ops(&first.effects).len(), 1);
        assert!(http_ops(&second.effects).is_empty());
        assert_eq!(model.status, FormStatus::Submitting);
    }

    #[test]
    fn stale_submission_response_is_ignored() {
        let (app, mut model) = started();
        let _ = app.update(
            Event::DescriptionChanged { text: "x".into() },
            &mut model,
        );
        let _ = app.update(Event::Submit, &mut model);
        let _ = app.update(
            Event::SubmissionResponse {
                attempt_id: "not-the-current-attempt".into(),
                result: response(200),
            },
            &mut model,
        );
        assert_eq!(model.status, FormStatus::Submitting);
    }

    #[test]
    fn edits_while_submitting_are_rejected() {
        let (app, mut model) = started();
        let _ = app.update(
            Event::DescriptionChanged { text: "x".into() },
            &mut model,
        );
        let _ = app.update(Event::Submit, &mut model);
        let update = app.update(
            Event::DescriptionChanged { text: "y".into() },
            &mut model,
        );
        assert_eq!(model.draft.description, "x");
        assert!(kv_ops(&update.effects).is_empty());
        assert_eq!(
            model.active_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::InvalidState)
        );
    }

    #[test]
    fn save_failure_is_surfaced_and_cleared_by_next_save() {
        let (app, mut model) = started();
        let _ = app.update(
            Event::DraftSaved(Box::new(Err(crate::capabilities::KvError::storage(
                crate::capabilities::StorageErrorCode::DiskFull,
                "full",
            )))),
            &mut model,
        );
        assert_eq!(
            model.active_error.as_ref().map(|e| e.kind),
            Some(ErrorKind::Persistence)
        );

        let _ = app.update(
            Event::DraftSaved(Box::new(Ok(None))),
            &mut model,
        );
        assert!(model.active_error.is_none());
    }

    #[test]
    fn view_reflects_model() {
        let (app, mut model) = started();
        let _ = app.update(
            Event::DescriptionChanged {
                text: "pothole".into(),
            },
            &mut model,
        );
        let view = App.view(&model);
        assert!(view.is_ready);
        assert!(view.can_submit);
        assert_eq!(view.description, "pothole");
        assert_eq!(view.status, FormStatus::Editing);
        assert!(view.image.is_none());
        assert!(!view.is_submitting);
    }
}
