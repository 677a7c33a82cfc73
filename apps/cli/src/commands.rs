//! Server-side management commands: status, cancel and cleanup.

use chunkflow_protocol::ChunkUploadInfo;
use chunkflow_transfer::format_file_size;
use chunkflow_uploader::{HttpUploadService, UploadService};

pub async fn status(service: &HttpUploadService, upload_id: &str) -> anyhow::Result<()> {
    let info = service.progress(upload_id).await?;
    println!("{}", describe(&info));
    Ok(())
}

pub async fn cancel(service: &HttpUploadService, upload_id: &str) -> anyhow::Result<()> {
    service.cancel(upload_id).await?;
    println!("upload {upload_id} cancelled");
    Ok(())
}

pub async fn cleanup(service: &HttpUploadService) -> anyhow::Result<()> {
    let purged = service.cleanup_expired().await?;
    println!("removed {purged} expired upload(s)");
    Ok(())
}

/// Human-readable summary of a server-side upload descriptor.
fn describe(info: &ChunkUploadInfo) -> String {
    let mut lines = vec![format!("upload:   {}", info.upload_id)];
    if let Some(name) = &info.file_name {
        lines.push(format!("file:     {name}"));
    }
    if let Some(size) = info.file_size {
        lines.push(format!("size:     {}", format_file_size(size)));
    }
    if let Some(total) = info.total_chunks {
        lines.push(format!(
            "chunks:   {}/{total} ({:.1}%)",
            info.uploaded_chunks.unwrap_or(0),
            info.percentage()
        ));
    }
    if let Some(status) = info.status {
        let text = info
            .status_text
            .as_deref()
            .map(|t| format!(" ({t})"))
            .unwrap_or_default();
        lines.push(format!("status:   {status}{text}"));
    }
    if let Some(path) = &info.final_path {
        lines.push(format!("path:     {path}"));
    }
    if let Some(expires) = &info.expires_at {
        lines.push(format!("expires:  {expires}"));
    }
    lines.join("\n")
}
