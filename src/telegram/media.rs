//! Voice note download.
//!
//! Voice notes are pulled into memory and handed to the transcriber; nothing
//! is written to disk.

use anyhow::Context;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::Voice;
use tracing::debug;

use crate::transcription::AudioClip;

/// Telegram voice notes are OGG/Opus.
pub const VOICE_MIME: &str = "audio/ogg";

/// Download a voice note into an [`AudioClip`].
///
/// # Errors
///
/// Returns an error if the file cannot be resolved or downloaded.
pub async fn download_voice(bot: &Bot, voice: &Voice) -> anyhow::Result<AudioClip> {
    let bytes = download_telegram_file(bot, &voice.file.id).await?;
    debug!(bytes = bytes.len(), duration = ?voice.duration, "voice note downloaded");
    Ok(AudioClip {
        bytes,
        file_name: "voice.ogg".to_owned(),
        mime_type: voice
            .mime_type
            .as_ref()
            .map_or_else(|| VOICE_MIME.to_owned(), ToString::to_string),
    })
}

/// Download a file from Telegram by file ID into memory.
async fn download_telegram_file(bot: &Bot, file_id: &str) -> anyhow::Result<Vec<u8>> {
    let file = bot
        .get_file(file_id)
        .await
        .context("failed to get file info from Telegram")?;

    let mut buffer: Vec<u8> = Vec::new();
    bot.download_file(&file.path, &mut buffer)
        .await
        .context("failed to download file from Telegram")?;
    Ok(buffer)
}
