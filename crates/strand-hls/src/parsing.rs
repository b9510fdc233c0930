//! M3U8 playlist parsing.
//!
//! The line walker is deliberately hand-written: strict-mode tag rejection,
//! `METHOD=NONE` clearing, later-key-wins and `Arc`-shared key specs are
//! all part of the engine's contract, so the grammar lives here rather than
//! behind a general-purpose parser crate. `parse_master` / `parse_media`
//! are pure text functions; [`parse_playlist`] adds the fetch-and-recurse
//! driver that follows master playlists through the variant selector.

use std::{sync::Arc, time::Duration};

use strand_net::{Fetcher, NetError};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{HlsError, HlsResult},
    playlist::{EncryptionMethod, EncryptionSpec, Playlist, Segment, VariantSelector, VariantStream},
};

/// Master playlists may point at further master playlists; bound the chain.
const MAX_VARIANT_HOPS: usize = 4;

/// Fetch and parse the playlist at `url`, following master playlists
/// through `selector` until a media playlist is reached.
pub async fn parse_playlist(
    fetcher: &dyn Fetcher,
    url: &Url,
    strict: bool,
    selector: Option<&VariantSelector>,
) -> HlsResult<Playlist> {
    let mut url = url.clone();

    for _ in 0..MAX_VARIANT_HOPS {
        let bytes = fetcher.fetch_bytes(&url).await.map_err(|e| match e {
            NetError::Cancelled => HlsError::Cancelled,
            other => HlsError::InvalidPlaylist(format!("failed to fetch playlist: {other}")),
        })?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| HlsError::InvalidPlaylist(format!("playlist is not UTF-8: {e}")))?;

        if !is_master(text) {
            return parse_media(text, &url, strict);
        }

        let variants = parse_master(text, &url)?;
        let selector = selector.ok_or_else(|| {
            HlsError::InvalidPlaylist("master playlist requires a variant selector".into())
        })?;
        let chosen = selector(&variants).ok_or_else(|| {
            HlsError::InvalidPlaylist("variant selector declined every variant".into())
        })?;
        let variant = variants.get(chosen).ok_or_else(|| {
            HlsError::InvalidPlaylist(format!(
                "variant selector returned index {chosen}, playlist has {} variants",
                variants.len()
            ))
        })?;

        debug!(variant = chosen, url = %variant.url, "following master playlist variant");
        url = variant.url.clone();
    }

    Err(HlsError::InvalidPlaylist(
        "master playlist chain exceeds hop limit".into(),
    ))
}

/// Whether the document is a master playlist.
fn is_master(text: &str) -> bool {
    text.contains("#EXT-X-STREAM-INF")
}

fn check_header(text: &str) -> HlsResult<()> {
    match text.lines().find(|line| !line.trim().is_empty()) {
        Some(first) if first.trim_start().starts_with("#EXTM3U") => Ok(()),
        _ => Err(HlsError::InvalidPlaylist(
            "missing #EXTM3U header".into(),
        )),
    }
}

/// Parse a master playlist into its variant list, resolving URIs against
/// `base`.
pub fn parse_master(text: &str, base: &Url) -> HlsResult<Vec<VariantStream>> {
    check_header(text)?;

    let mut variants = Vec::new();
    let mut lines = text.lines().map(str::trim);

    while let Some(line) = lines.next() {
        let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") else {
            continue;
        };
        let attrs = parse_attributes(rest);

        // The variant URI is the next non-blank line.
        let uri = loop {
            match lines.next() {
                Some(candidate) if candidate.is_empty() => {}
                Some(candidate) if candidate.starts_with('#') => {
                    return Err(HlsError::InvalidPlaylist(format!(
                        "#EXT-X-STREAM-INF not followed by a URI line, got: {candidate}"
                    )));
                }
                Some(candidate) => break candidate,
                None => {
                    return Err(HlsError::InvalidPlaylist(
                        "#EXT-X-STREAM-INF at end of playlist".into(),
                    ));
                }
            }
        };

        let url = base.join(uri).map_err(|e| {
            HlsError::InvalidPlaylist(format!("cannot resolve variant URI {uri}: {e}"))
        })?;

        variants.push(VariantStream {
            url,
            bandwidth: attr(&attrs, "BANDWIDTH").and_then(|v| v.parse().ok()),
            resolution: attr(&attrs, "RESOLUTION").map(str::to_string),
            codecs: attr(&attrs, "CODECS").map(str::to_string),
        });
    }

    Ok(variants)
}

/// Parse a media playlist, resolving segment and key URIs against `base`.
pub fn parse_media(text: &str, base: &Url, strict: bool) -> HlsResult<Playlist> {
    check_header(text)?;

    let mut segments: Vec<Segment> = Vec::new();
    let mut target_duration = None;
    let mut media_sequence = 0u64;
    let mut end_list = false;

    let mut current_key: Option<Arc<EncryptionSpec>> = None;
    let mut pending_duration: Option<Duration> = None;
    let mut pending_title: Option<String> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }

        if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            let seconds: f64 = value.trim().parse().map_err(|_| {
                HlsError::InvalidPlaylist(format!("bad #EXT-X-TARGETDURATION value: {value}"))
            })?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(HlsError::InvalidPlaylist(format!(
                    "bad #EXT-X-TARGETDURATION value: {value}"
                )));
            }
            target_duration = Some(Duration::from_secs_f64(seconds));
        } else if let Some(value) = line.strip_prefix("#EXTINF:") {
            let (duration, title) = match value.split_once(',') {
                Some((d, t)) => (d, t.trim()),
                None => (value, ""),
            };
            let seconds: f64 = duration.trim().parse().map_err(|_| {
                HlsError::InvalidPlaylist(format!("bad #EXTINF duration: {duration}"))
            })?;
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(HlsError::InvalidPlaylist(format!(
                    "bad #EXTINF duration: {duration}"
                )));
            }
            pending_duration = Some(Duration::from_secs_f64(seconds));
            pending_title = (!title.is_empty()).then(|| title.to_string());
        } else if let Some(rest) = line.strip_prefix("#EXT-X-KEY:") {
            // A later tag before any intervening segment replaces the
            // earlier one.
            current_key = parse_key_tag(rest, base)?;
        } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            media_sequence = value.trim().parse().map_err(|_| {
                HlsError::InvalidPlaylist(format!("bad #EXT-X-MEDIA-SEQUENCE value: {value}"))
            })?;
        } else if line.starts_with("#EXT-X-ENDLIST") {
            end_list = true;
        } else if line.starts_with("#EXTM3U")
            || line.starts_with("#EXT-X-VERSION")
            || line.starts_with("#EXT-X-PLAYLIST-TYPE")
        {
            // Recognized, nothing to record.
        } else if line.starts_with('#') {
            if strict {
                return Err(HlsError::UnsupportedTag(line.to_string()));
            }
            debug!(tag = line, "ignoring unrecognized playlist tag");
        } else {
            let url = base.join(line).map_err(|e| {
                HlsError::InvalidPlaylist(format!("cannot resolve segment URI {line}: {e}"))
            })?;
            let index = segments.len();
            segments.push(Segment {
                index,
                sequence: media_sequence + index as u64,
                url,
                duration: pending_duration.take().unwrap_or(Duration::ZERO),
                title: pending_title.take(),
                encryption: current_key.clone(),
            });
        }
    }

    if segments.is_empty() {
        return Err(HlsError::EmptyPlaylist);
    }

    if let Some(target) = target_duration {
        for segment in &segments {
            if segment.duration > target {
                if strict {
                    return Err(HlsError::InvalidPlaylist(format!(
                        "segment {} duration {:?} exceeds target duration {:?}",
                        segment.index, segment.duration, target
                    )));
                }
                warn!(
                    index = segment.index,
                    duration_s = segment.duration.as_secs_f64(),
                    target_s = target.as_secs_f64(),
                    "segment duration exceeds target duration"
                );
            }
        }
    }

    Ok(Playlist {
        segments,
        target_duration,
        media_sequence,
        end_list,
    })
}

fn parse_key_tag(rest: &str, base: &Url) -> HlsResult<Option<Arc<EncryptionSpec>>> {
    let attrs = parse_attributes(rest);
    let method = attr(&attrs, "METHOD")
        .ok_or_else(|| HlsError::InvalidPlaylist("#EXT-X-KEY without METHOD".into()))?;

    match method {
        "NONE" => Ok(None),
        "AES-128" => {
            let uri = attr(&attrs, "URI")
                .ok_or_else(|| HlsError::InvalidPlaylist("#EXT-X-KEY without URI".into()))?;
            let key_url = base.join(uri).map_err(|e| {
                HlsError::InvalidPlaylist(format!("cannot resolve key URI {uri}: {e}"))
            })?;
            let iv = attr(&attrs, "IV").map(decode_iv).transpose()?;
            Ok(Some(Arc::new(EncryptionSpec::new(
                EncryptionMethod::Aes128,
                key_url,
                iv,
            ))))
        }
        other => Err(HlsError::InvalidPlaylist(format!(
            "unsupported encryption method: {other}"
        ))),
    }
}

/// Split an attribute list into `KEY=VALUE` pairs. Values are either
/// quoted strings (which may contain commas) or bare runs up to the next
/// comma.
fn parse_attributes(input: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = input;

    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_string();
        let after = &rest[eq + 1..];

        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => {
                    let tail = &quoted[end + 1..];
                    (
                        quoted[..end].to_string(),
                        tail.strip_prefix(',').unwrap_or(tail),
                    )
                }
                None => (quoted.to_string(), ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (after[..end].trim().to_string(), &after[end + 1..]),
                None => (after.trim().to_string(), ""),
            }
        };

        if !key.is_empty() {
            attrs.push((key, value));
        }
        rest = remainder;
    }

    attrs
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Decode an `IV=0x…` attribute: `0x` plus exactly 32 hex digits.
fn decode_iv(value: &str) -> HlsResult<[u8; 16]> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| HlsError::InvalidConfig(format!("IV must start with 0x: {value}")))?;

    if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HlsError::InvalidConfig(format!(
            "IV must be 32 hex digits, got: {value}"
        )));
    }

    let mut iv = [0u8; 16];
    for (i, byte) in iv.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| HlsError::InvalidConfig(format!("IV is not valid hex: {value}")))?;
    }
    Ok(iv)
}
