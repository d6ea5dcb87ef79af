//! URN/pointer helpers used by the profile expansion pipeline (C10).

/// Strip the token id from a collections-v2 wearable/emote URN. A
/// collections-v2 URN has the shape:
/// `urn:decentraland:<network>:collections-v2:<contract>:<item>[:<token-id>]`
/// (6 segments without a token id, 7 with). Truncating to the first six
/// colon-delimited segments drops the token id; URNs that are already six
/// segments (or fewer) are returned unchanged, making this idempotent.
pub fn urn_to_pointer(urn: &str) -> String {
    let segments: Vec<&str> = urn.split(':').collect();
    if segments.len() > 6 {
        segments[..6].join(":")
    } else {
        urn.to_owned()
    }
}

/// True if `urn` refers to one of the base (non-collection) wearables or
/// emotes, which the profile pipeline never needs to re-optimize.
pub fn is_base_item(urn: &str, exclude_marker: &str) -> bool {
    urn.contains(exclude_marker)
}

/// Build the set of pointers to resolve for a profile's wearables,
/// excluding base avatar items and stripping collections-v2 token ids.
pub fn wearable_pointers<'a>(wearables: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    wearables
        .into_iter()
        .filter(|urn| !is_base_item(urn, "base-avatars"))
        .map(urn_to_pointer)
        .collect()
}

/// Build the set of pointers to resolve for a profile's emotes, excluding
/// base emotes and stripping collections-v2 token ids.
pub fn emote_pointers<'a>(emote_urns: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    emote_urns
        .into_iter()
        .filter(|urn| !is_base_item(urn, "base-emotes"))
        .map(urn_to_pointer)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_token_id_from_collections_v2_urn() {
        let urn = "urn:decentraland:matic:collections-v2:0xabc:0:12345";
        assert_eq!(
            urn_to_pointer(urn),
            "urn:decentraland:matic:collections-v2:0xabc:0"
        );
    }

    #[test]
    fn leaves_short_urns_untouched_and_is_idempotent() {
        let urn = "urn:decentraland:matic:collections-v2:0xabc:0";
        let once = urn_to_pointer(urn);
        let twice = urn_to_pointer(&once);
        assert_eq!(once, urn);
        assert_eq!(twice, urn);
    }

    #[test]
    fn excludes_base_avatars_and_base_emotes() {
        let wearables = vec![
            "urn:decentraland:off-chain:base-avatars:eyebrows_00",
            "urn:decentraland:matic:collections-v2:0xabc:0:5",
        ];
        let pointers = wearable_pointers(wearables);
        assert_eq!(pointers, vec!["urn:decentraland:matic:collections-v2:0xabc:0"]);

        let emotes = vec![
            "urn:decentraland:off-chain:base-emotes:wave",
            "urn:decentraland:matic:collections-v2:0xdef:1:9",
        ];
        let pointers = emote_pointers(emotes);
        assert_eq!(pointers, vec!["urn:decentraland:matic:collections-v2:0xdef:1"]);
    }
}
