use std::collections::BTreeMap;

use updraft_platform::PlatformTarget;
use updraft_release::{Asset, AssetId, Release};

/// The release with the latest publication time. On ties the first one in
/// `releases` wins.
#[must_use]
pub fn select_latest_release(releases: Vec<Release>) -> Option<Release> {
    let mut latest: Option<Release> = None;
    for release in releases {
        match &latest {
            Some(current) if release.published_at <= current.published_at => {}
            _ => latest = Some(release),
        }
    }
    latest
}

/// Pick the asset built for `target`.
///
/// An asset whose label (or name, when unlabeled) contains `<os>_<word size>`
/// is preferred and ends the scan. On a 64-bit target each `<os>_32` asset
/// replaces the fallback while scanning continues, so the last one wins.
#[must_use]
pub fn select_asset<'a>(
    assets: &'a BTreeMap<AssetId, Asset>,
    target: &PlatformTarget,
) -> Option<&'a Asset> {
    let preferred = target.preferred_token();
    let compatible = target.compatible_token();

    let mut fallback = None;
    for asset in assets.values() {
        if asset.matches_token(&preferred) {
            return Some(asset);
        }
        if compatible
            .as_deref()
            .is_some_and(|token| asset.matches_token(token))
        {
            fallback = Some(asset);
        }
    }
    fallback
}
