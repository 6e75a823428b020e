//! `media` and `store` subcommands.

use tourgen_core::candidates::ResourceType;
use tourgen_media::cloudinary::CloudinaryClient;
use tourgen_media::host::{ListQuery, MediaAsset, MediaHost, UploadRequest};
use tourgen_media::object_store::{get_key, resource_type_for, ObjectStoreClient};

use super::Context;
use crate::args::{MediaCommand, StoreCommand};
use crate::commands::jobs::DownloadInfo;
use crate::exit::Exit;
use crate::output::format_bytes;

pub async fn media(ctx: &Context, command: MediaCommand) -> anyhow::Result<Exit> {
    let cloud = ctx.config.require_cloudinary()?.clone();
    let client = CloudinaryClient::new(cloud, ctx.config.request_timeout)?;

    match command {
        MediaCommand::Upload {
            file,
            public_id,
            folder,
            video,
        } => {
            let resource_type = if video {
                ResourceType::Video
            } else {
                ResourceType::Image
            };
            let request = UploadRequest::from_path(&file, resource_type)
                .await?
                .with_public_id(public_id)
                .with_folder(folder);
            let asset = client.upload(request).await?;
            ctx.out.emit(&asset, || asset_lines(&asset))?;
        }
        MediaCommand::List {
            prefix,
            limit,
            images,
        } => {
            let query = ListQuery {
                resource_type: if images {
                    ResourceType::Image
                } else {
                    ResourceType::Video
                },
                prefix,
                limit,
            };
            let assets = client.list(&query).await?;
            ctx.out.emit(&assets, || {
                let mut lines: Vec<String> = assets.iter().map(asset_row).collect();
                lines.push(format!("{} asset(s)", assets.len()));
                lines
            })?;
        }
    }
    Ok(Exit::Success)
}

pub async fn store(ctx: &Context, command: StoreCommand) -> anyhow::Result<Exit> {
    let store = ObjectStoreClient::new(
        ctx.config.require_object_store()?,
        ctx.config.request_timeout,
    )?;

    match command {
        StoreCommand::Put { file, key } => {
            let request = UploadRequest::from_path(&file, resource_type_for(&key))
                .await?
                .with_public_id(Some(key));
            let asset = store.upload(request).await?;
            ctx.out.emit(&asset, || asset_lines(&asset))?;
        }
        StoreCommand::Get { key, out } => {
            let bytes = get_key(&store, &key).await?;
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&out, &bytes).await?;
            let info = DownloadInfo {
                path: out,
                bytes: bytes.len() as u64,
            };
            ctx.out.emit(&info, || {
                vec![format!("Saved {} ({})", info.path.display(), format_bytes(info.bytes))]
            })?;
        }
    }
    Ok(Exit::Success)
}

fn asset_lines(asset: &MediaAsset) -> Vec<String> {
    let mut lines = vec![
        format!("Uploaded {}", asset.public_id),
        format!("  url:  {}", asset.url),
    ];
    if let Some(bytes) = asset.bytes {
        lines.push(format!("  size: {}", format_bytes(bytes)));
    }
    lines
}

fn asset_row(asset: &MediaAsset) -> String {
    let created = asset
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let size = asset.bytes.map(format_bytes).unwrap_or_else(|| "-".to_string());
    format!("{created:<16}  {size:>10}  {}", asset.url)
}
