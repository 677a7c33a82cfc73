use std::time::Duration;

/// Base path of the chunk-upload service.
pub const CHUNK_API_BASE: &str = "/upload/chunk";

/// Endpoint paths, relative to [`CHUNK_API_BASE`].
pub const ENDPOINT_INIT: &str = "/init";
pub const ENDPOINT_UPLOAD: &str = "/upload";
pub const ENDPOINT_MERGE: &str = "/merge";
pub const ENDPOINT_PROGRESS: &str = "/progress";
pub const ENDPOINT_CANCEL: &str = "/cancel";
pub const ENDPOINT_CHECK: &str = "/check";
pub const ENDPOINT_CLEANUP: &str = "/cleanup";

/// Multipart field names of the chunk upload request.
pub const FIELD_UPLOAD_ID: &str = "uploadId";
pub const FIELD_CHUNK_INDEX: &str = "chunkIndex";
pub const FIELD_CHUNK: &str = "chunk";
pub const FIELD_CHUNK_MD5: &str = "chunkMd5";

/// API result codes carried in the response envelope.
pub const API_SUCCESS: i32 = 200;
pub const API_BAD_REQUEST: i32 = 400;
pub const API_UNAUTHORIZED: i32 = 401;
pub const API_FORBIDDEN: i32 = 403;
pub const API_NOT_FOUND: i32 = 404;
pub const API_INTERNAL_ERROR: i32 = 500;

/// Largest chunk the server accepts before it renegotiates the size (4 MiB).
pub const SERVER_MAX_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Path of the notification WebSocket endpoint.
pub const NOTIFY_PATH: &str = "/api/ws/message";

/// Query parameter identifying the owner on the notification channel.
pub const NOTIFY_OWNER_PARAM: &str = "userId";

/// Heartbeat frames exchanged on the notification channel.
pub const HEARTBEAT_PING: &str = "ping";
pub const HEARTBEAT_PONG: &str = "pong";

/// How often the client sends a heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before reconnecting after an unexpected close.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Delay before trying the next endpoint after a failed connect.
pub const ENDPOINT_FALLBACK_DELAY: Duration = Duration::from_secs(1);

/// Reconnect attempts before the channel gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
