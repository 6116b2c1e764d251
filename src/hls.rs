//! Adaptive-manifest rewriting.
//!
//! Parses an HLS playlist into the `m3u8-rs` structural model, tokenizes
//! every embedded link (segments, keys, init sections, alternate renditions,
//! variant streams) through the [`UrlRewriter`], and thins the variant set:
//! incompatible codec families are dropped outright and at most one variant
//! survives per distinct resolution, selected by highest bandwidth, in
//! first-seen resolution order.

use std::collections::HashMap;

use m3u8_rs::{parse_playlist_res, MasterPlaylist, MediaPlaylist, Playlist, VariantStream};

use crate::error::ProxyError;
use crate::rewrite::UrlRewriter;

/// Rewrite manifest text so every reference points back through the proxy.
///
/// A manifest that fails to parse is a terminal error for the response;
/// there is no partial-recovery mode.
pub fn rewrite_manifest(rewriter: &UrlRewriter, text: &str) -> Result<String, ProxyError> {
    if !text.trim_start().starts_with("#EXTM3U") {
        return Err(ProxyError::ManifestMalformed(
            "missing #EXTM3U header".to_string(),
        ));
    }

    match parse_playlist_res(text.as_bytes()) {
        Ok(Playlist::MasterPlaylist(mut playlist)) => {
            rewrite_master(rewriter, &mut playlist);
            render(|out| playlist.write_to(out))
        }
        Ok(Playlist::MediaPlaylist(mut playlist)) => {
            rewrite_media(rewriter, &mut playlist);
            render(|out| playlist.write_to(out))
        }
        Err(_) => Err(ProxyError::ManifestMalformed(
            "unparseable playlist".to_string(),
        )),
    }
}

fn render(
    write: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>,
) -> Result<String, ProxyError> {
    let mut out = Vec::new();
    write(&mut out).map_err(|e| ProxyError::ManifestMalformed(e.to_string()))?;
    String::from_utf8(out).map_err(|e| ProxyError::ManifestMalformed(e.to_string()))
}

fn rewrite_master(rewriter: &UrlRewriter, playlist: &mut MasterPlaylist) {
    for alternative in &mut playlist.alternatives {
        if let Some(uri) = &alternative.uri {
            alternative.uri = Some(rewriter.rewrite_manifest_child(uri));
        }
    }

    let variants = std::mem::take(&mut playlist.variants);
    playlist.variants = thin_variants(rewriter, variants);
}

/// Codec filter plus per-resolution dedup. The first variant at a resolution
/// is kept until a strictly higher-bandwidth one at the same resolution
/// replaces it; survivors keep first-seen resolution order.
fn thin_variants(rewriter: &UrlRewriter, variants: Vec<VariantStream>) -> Vec<VariantStream> {
    let compatible = &rewriter.patterns().compatible_codecs;
    let mut kept: Vec<VariantStream> = Vec::new();
    let mut slot_by_resolution: HashMap<Option<(u64, u64)>, usize> = HashMap::new();

    for mut variant in variants {
        if !codec_compatible(variant.codecs.as_deref().unwrap_or(""), compatible) {
            continue;
        }

        let resolution = variant.resolution.as_ref().map(|r| (r.width, r.height));
        match slot_by_resolution.get(&resolution) {
            None => {
                variant.uri = rewriter.rewrite_manifest_child(&variant.uri);
                slot_by_resolution.insert(resolution, kept.len());
                kept.push(variant);
            }
            Some(&slot) => {
                if variant.bandwidth > kept[slot].bandwidth {
                    variant.uri = rewriter.rewrite_manifest_child(&variant.uri);
                    kept[slot] = variant;
                }
            }
        }
    }

    kept
}

fn codec_compatible(codecs: &str, compatible: &[String]) -> bool {
    codecs
        .split(',')
        .map(str::trim)
        .any(|codec| compatible.iter().any(|family| codec.starts_with(family.as_str())))
}

fn rewrite_media(rewriter: &UrlRewriter, playlist: &mut MediaPlaylist) {
    for segment in &mut playlist.segments {
        segment.uri = rewriter.rewrite_manifest_child(&segment.uri);

        if let Some(key) = &mut segment.key {
            if let Some(uri) = &key.uri {
                key.uri = Some(rewriter.rewrite_manifest_child(uri));
            }
        }

        if let Some(map) = &mut segment.map {
            map.uri = rewriter.rewrite_manifest_child(&map.uri);
        }
    }
}
