//! `fixtures` subcommands.

use serde::Serialize;

use tourgen_core::ffmpeg::{encode_slideshow, probe_video, summarize};
use tourgen_core::fixtures::{generate_test_images, FixtureFormat};

use super::Context;
use crate::args::FixturesCommand;
use crate::exit::Exit;
use crate::output::format_bytes;

pub async fn run(ctx: &Context, command: FixturesCommand) -> anyhow::Result<Exit> {
    match command {
        FixturesCommand::Images {
            out,
            count,
            width,
            height,
            jpeg,
        } => {
            let format = if jpeg {
                FixtureFormat::Jpeg
            } else {
                FixtureFormat::Png
            };
            let paths = tokio::task::spawn_blocking(move || {
                generate_test_images(&out, count, width, height, format)
            })
            .await??;
            ctx.out.emit(&paths, || {
                let mut lines: Vec<String> =
                    paths.iter().map(|p| p.display().to_string()).collect();
                lines.push(format!("{} fixture(s) written", paths.len()));
                lines
            })?;
        }
        FixturesCommand::Video {
            out,
            images,
            secs_per_image,
            fps,
        } => {
            encode_slideshow(&images, &out, secs_per_image, fps).await?;
            let size = tokio::fs::metadata(&out).await?.len();

            #[derive(Serialize)]
            struct Encoded<'a> {
                path: &'a std::path::Path,
                frames: usize,
                bytes: u64,
            }
            let encoded = Encoded {
                path: &out,
                frames: images.len(),
                bytes: size,
            };
            ctx.out.emit(&encoded, || {
                vec![format!(
                    "Encoded {} image(s) into {} ({})",
                    encoded.frames,
                    encoded.path.display(),
                    format_bytes(encoded.bytes)
                )]
            })?;
        }
        FixturesCommand::Inspect { file } => {
            let summary = summarize(&probe_video(&file).await?);
            ctx.out.emit(&summary, || {
                vec![
                    format!("{}", file.display()),
                    format!("  duration:  {:.2}s", summary.duration_secs),
                    format!(
                        "  size:      {}x{}",
                        summary.width.unwrap_or_default(),
                        summary.height.unwrap_or_default()
                    ),
                    format!(
                        "  framerate: {}",
                        summary
                            .framerate
                            .map(|f| format!("{f:.2}"))
                            .unwrap_or_else(|| "-".to_string())
                    ),
                    format!(
                        "  codec:     {}",
                        summary.video_codec.as_deref().unwrap_or("-")
                    ),
                    format!("  audio:     {}", if summary.has_audio { "yes" } else { "no" }),
                ]
            })?;
        }
    }
    Ok(Exit::Success)
}
