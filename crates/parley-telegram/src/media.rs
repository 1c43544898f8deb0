// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Voice note download.

use parley_core::ParleyError;
use parley_core::types::{ChatKind, InboundContent};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileMeta, Voice};
use tracing::debug;

/// Downloads a file from Telegram servers by its file metadata.
pub async fn download_file(bot: &Bot, file_meta: &FileMeta) -> Result<Vec<u8>, ParleyError> {
    let file = bot
        .get_file(file_meta.id.clone())
        .await
        .map_err(|e| ParleyError::Channel {
            message: format!("failed to get file info: {e}"),
            source: Some(Box::new(e)),
        })?;

    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| ParleyError::Channel {
            message: format!("failed to download file: {e}"),
            source: Some(Box::new(e)),
        })?;

    debug!(file_id = %file_meta.id, size = buf.len(), "downloaded file from Telegram");
    Ok(buf)
}

/// Voice content of a message. Group voice notes are not downloaded: the
/// pipeline refuses them without looking at the audio.
pub async fn voice_content(
    bot: &Bot,
    voice: &Voice,
    kind: ChatKind,
) -> Result<InboundContent, ParleyError> {
    let duration_secs = u32::try_from(voice.duration.seconds()).unwrap_or(u32::MAX);
    let data = match kind {
        ChatKind::Private => download_file(bot, &voice.file).await?,
        ChatKind::Group => Vec::new(),
    };
    Ok(InboundContent::Voice {
        data,
        duration_secs,
    })
}
