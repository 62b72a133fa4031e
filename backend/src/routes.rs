use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures_util::TryStreamExt;
use serde::Deserialize;
use shared::{HistoryEntry, UploadResponse};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::extractor::AuthenticatedUser;
use crate::auth::jwt::JwtService;
use crate::auth::password::PasswordHasher;
use crate::auth::routes as auth_routes;
use crate::auth::service::AuthService;
use crate::config::AppConfig;
use crate::db::upload_repository::UploadRepository;
use crate::db::user_repository::UserRepository;
use crate::detection::config::is_unit_threshold;
use crate::detection::{DetectRequest, DetectionOutcome, Detector};
use crate::error::ApiError;
use crate::storage::local_store::{LocalStore, StorageError, StoredUpload};

/// Detection and access settings shared by the upload handlers.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub default_confidence: f32,
    pub iou_threshold: f32,
    pub image_size: u32,
    pub output_require_owner: bool,
}

impl UploadSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_confidence: config.detector.default_confidence,
            iou_threshold: config.detector.iou_threshold,
            image_size: config.detector.image_size,
            output_require_owner: config.output_require_owner,
        }
    }
}

/// Everything the handlers pull out of app data, built once and cloned into
/// each worker.
#[derive(Clone)]
pub struct Services {
    jwt: web::Data<JwtService>,
    auth: web::Data<AuthService>,
    uploads: web::Data<UploadRepository>,
    store: web::Data<LocalStore>,
    detector: web::Data<dyn Detector>,
    settings: web::Data<UploadSettings>,
}

impl Services {
    pub fn new(config: &AppConfig, pool: SqlitePool, detector: Arc<dyn Detector>) -> Self {
        Self::with_hasher(config, pool, detector, PasswordHasher::new())
    }

    pub fn with_hasher(
        config: &AppConfig,
        pool: SqlitePool,
        detector: Arc<dyn Detector>,
        hasher: PasswordHasher,
    ) -> Self {
        let store = LocalStore::new(
            config.upload_dir.clone(),
            config.output_dir.clone(),
            config.max_upload_bytes,
        );
        Self {
            jwt: web::Data::new(JwtService::with_ttl(&config.jwt_secret, config.token_ttl)),
            auth: web::Data::new(AuthService::new(UserRepository::new(pool.clone()), hasher)),
            uploads: web::Data::new(UploadRepository::new(pool)),
            store: web::Data::new(store),
            detector: web::Data::from(detector),
            settings: web::Data::new(UploadSettings::from_config(config)),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Register the shared state and every route on `cfg`.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.jwt.clone())
            .app_data(self.auth.clone())
            .app_data(self.uploads.clone())
            .app_data(self.store.clone())
            .app_data(self.detector.clone())
            .app_data(self.settings.clone())
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                ApiError::Validation(err.to_string()).into()
            }));
        configure_routes(cfg);
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/signup").route(web::post().to(auth_routes::signup)))
        .service(web::resource("/login").route(web::post().to(auth_routes::login)))
        .service(web::resource("/uploadimage").route(web::post().to(upload_image)))
        .service(web::resource("/output/{image_id}").route(web::get().to(get_output_image)))
        .service(web::resource("/history").route(web::get().to(get_history)));
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub conf: Option<f32>,
}

/// The identity extractor runs before the multipart body is touched, so an
/// unauthenticated request never writes a file or reaches the model.
async fn upload_image(
    user: AuthenticatedUser,
    params: web::Query<UploadParams>,
    mut payload: Multipart,
    store: web::Data<LocalStore>,
    uploads: web::Data<UploadRepository>,
    detector: web::Data<dyn Detector>,
    settings: web::Data<UploadSettings>,
) -> Result<HttpResponse, ApiError> {
    let conf = params.conf.unwrap_or(settings.default_confidence);
    if !is_unit_threshold(conf) {
        return Err(ApiError::Validation(format!(
            "conf must be in (0, 1], got {}",
            conf
        )));
    }

    let (filename, data) = read_file_field(&mut payload, store.max_upload_bytes()).await?;
    let stored = store.save_upload(&filename, &data).await?;
    drop(data);
    let output_path = match store.reserve_output(&stored.filename).await {
        Ok(path) => path,
        Err(e) => {
            store.discard(&stored.path).await;
            return Err(e.into());
        }
    };

    let request = DetectRequest {
        image_path: stored.path.clone(),
        output_path: output_path.clone(),
        conf_threshold: conf,
        iou_threshold: settings.iou_threshold,
        image_size: settings.image_size,
    };

    match detect_and_record(&user, &stored, &output_path, request, &detector, &uploads).await {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(e) => {
            store.discard(&stored.path).await;
            store.discard(&output_path).await;
            Err(e)
        }
    }
}

async fn detect_and_record(
    user: &AuthenticatedUser,
    stored: &StoredUpload,
    output_path: &Path,
    request: DetectRequest,
    detector: &web::Data<dyn Detector>,
    uploads: &UploadRepository,
) -> Result<UploadResponse, ApiError> {
    let detector = detector.clone();
    let DetectionOutcome {
        detections,
        avg_confidence,
    } = web::block(move || detector.detect(&request)).await??;

    let record = uploads
        .create(
            &stored.filename,
            &output_path.to_string_lossy(),
            &detections,
            Some(avg_confidence),
            user.user_id(),
        )
        .await?;
    log::info!(
        "User {} uploaded {} as image {} ({} detections)",
        user.username(),
        stored.filename,
        record.id,
        detections.len()
    );

    Ok(UploadResponse {
        id: record.id,
        detections,
        output_image_endpoint: format!("/output/{}", record.id),
    })
}

/// Read the `file` part, enforcing the size limit while streaming. Other
/// parts are drained and ignored.
async fn read_file_field(
    payload: &mut Multipart,
    max_bytes: usize,
) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some("file") {
            while field.try_next().await?.is_some() {}
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();
        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            let size = data.len() + chunk.len();
            if size > max_bytes {
                return Err(StorageError::FileTooLarge {
                    size,
                    max: max_bytes,
                }
                .into());
            }
            data.extend_from_slice(&chunk);
        }
        return Ok((filename, data));
    }
    Err(ApiError::Validation("No file uploaded".to_string()))
}

async fn get_output_image(
    user: Option<AuthenticatedUser>,
    path: web::Path<i64>,
    uploads: web::Data<UploadRepository>,
    settings: web::Data<UploadSettings>,
) -> Result<NamedFile, ApiError> {
    let image_id = path.into_inner();
    // In owner mode the caller is checked first so unknown and foreign ids
    // look the same to anyone without a token.
    let owner = if settings.output_require_owner {
        Some(user.ok_or(ApiError::Unauthorized)?)
    } else {
        None
    };
    let image = uploads.get(image_id).await?.ok_or(ApiError::NotFound)?;

    if let Some(user) = owner {
        if user.user_id() != image.user_id {
            log::warn!(
                "User {} requested image {} owned by another user",
                user.username(),
                image_id
            );
            return Err(ApiError::NotFound);
        }
    }

    NamedFile::open_async(PathBuf::from(&image.output_path))
        .await
        .map_err(|e| {
            log::warn!("Output image {} is missing on disk: {}", image_id, e);
            ApiError::NotFound
        })
}

async fn get_history(
    user: AuthenticatedUser,
    uploads: web::Data<UploadRepository>,
) -> Result<HttpResponse, ApiError> {
    let history: Vec<HistoryEntry> = uploads
        .list_by_user(user.user_id())
        .await?
        .iter()
        .map(|image| image.to_history_entry())
        .collect();
    Ok(HttpResponse::Ok().json(history))
}
