//! Golden test vectors for deterministic verification.
//!
//! Ed25519 signing is deterministic, so each vector pins the signing
//! message, signature, id and full envelope bytes. Any change to the deep
//! hash, tag serialization or envelope layout breaks them.

use permabundle_core::{encode, DataItem, DataItemBuilder, Ed25519Signer, Tag};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Ed25519 secret key bytes.
    pub seed: [u8; 32],
    pub data: &'static [u8],
    pub tags: &'static [(&'static str, &'static str)],
    pub target: Option<[u8; 32]>,
    pub anchor: Option<[u8; 32]>,
    /// Expected values, all hex.
    pub expected_owner: &'static str,
    pub expected_tags_bytes: &'static str,
    pub expected_signing_message: &'static str,
    pub expected_signature: &'static str,
    pub expected_id: &'static str,
    pub expected_envelope: &'static str,
}

/// A deep hash input with its expected digest.
#[derive(Debug, Clone)]
pub struct DeepHashVector {
    pub name: &'static str,
    pub expected: &'static str,
}

/// Get all golden item vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "empty payload, no tags",
            seed: [0x42; 32],
            data: b"",
            tags: &[],
            target: None,
            anchor: None,
            expected_owner: "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
            expected_tags_bytes: "",
            expected_signing_message: "ae26a56a78ec729edf47ad783f1590d20a608fcd9d21924d260d808307c1a405",
            expected_signature: "c132b2bd6f146e3525d8dad2e8fa8888cbd704b687c141ef6e98c7563cd2a9c1e220791494595cf975b10cb18424df5fc8fa9207058cbf992c86342f47741905",
            expected_id: "2df6d239c1f40985a3502f361408329f203fd2170d83841aca19a857f364513a",
            expected_envelope: "0200c132b2bd6f146e3525d8dad2e8fa8888cbd704b687c141ef6e98c7563cd2a9c1e220791494595cf975b10cb18424df5fc8fa9207058cbf992c86342f477419052152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12000000000000000000000000000000000000",
        },
        GoldenVector {
            name: "hello with content type",
            seed: [0x42; 32],
            data: b"hello",
            tags: &[("Content-Type", "text/plain")],
            target: None,
            anchor: None,
            expected_owner: "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
            expected_tags_bytes: "0218436f6e74656e742d5479706514746578742f706c61696e00",
            expected_signing_message: "d0fdebab0d1ec90255a1e6f76e03fd1eac6a395f233647396184ac0a77a804ae",
            expected_signature: "24fd8861a568dac77827184d0f4b4c19ceaf9915c53fded61cde7d715245cd8105425055bc3bc6c5d6acf01c8cca1c7e9b006b1ae6c697a816977ed9dd3c3706",
            expected_id: "07c519a65172efabc625bdee6d883ad37f0d2ddd70e693c1c641f9c5f706d8ed",
            expected_envelope: "020024fd8861a568dac77827184d0f4b4c19ceaf9915c53fded61cde7d715245cd8105425055bc3bc6c5d6acf01c8cca1c7e9b006b1ae6c697a816977ed9dd3c37062152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12000001000000000000001a000000000000000218436f6e74656e742d5479706514746578742f706c61696e0068656c6c6f",
        },
        GoldenVector {
            name: "target, anchor and two tags",
            seed: [0x07; 32],
            data: b"permanent",
            tags: &[("App-Name", "permabundle"), ("Version", "1")],
            target: Some([0x11; 32]),
            anchor: Some([0x22; 32]),
            expected_owner: "ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c",
            expected_tags_bytes: "04104170702d4e616d65167065726d6162756e646c650e56657273696f6e023100",
            expected_signing_message: "b9423f84b84cddf3feeb536fac66fb4d09979fea8849b9a9c26da3f52d11f69a",
            expected_signature: "18b6ee56afe69fcd747cd6f05b216beb7756429619ec1d0b5907a9668d9705245ef1f2c7b1b64c31590f9140297bd41e9cb6495e2cd9b60705a9d66e0421d30f",
            expected_id: "d97b3abe99a68207307b809dd606a1d9139df53cab5ab76b94ad8c756325c49d",
            expected_envelope: "020018b6ee56afe69fcd747cd6f05b216beb7756429619ec1d0b5907a9668d9705245ef1f2c7b1b64c31590f9140297bd41e9cb6495e2cd9b60705a9d66e0421d30fea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c0111111111111111111111111111111111111111111111111111111111111111110122222222222222222222222222222222222222222222222222222222222222220200000000000000210000000000000004104170702d4e616d65167065726d6162756e646c650e56657273696f6e0231007065726d616e656e74",
        },
    ]
}

/// Deep hash digests of a few fixed shapes.
///
/// Inputs by name: `blob("")`, `blob("hello")`, `list()`, `list(a, list(b, c))`.
pub fn deep_hash_vectors() -> Vec<DeepHashVector> {
    vec![
        DeepHashVector {
            name: "empty blob",
            expected: "86f07880fc0c943bb9779834668465b34e325f0e90e61f04d00bed1dc18d585e",
        },
        DeepHashVector {
            name: "hello blob",
            expected: "9af9e3db51baa074ef83d32c1652d670738232c9fe29b998586b484b44652bce",
        },
        DeepHashVector {
            name: "empty list",
            expected: "8649f8f1cb3212527208a7999f6a5b6c23c265df8d2696c0b53b294600225b65",
        },
        DeepHashVector {
            name: "nested list",
            expected: "3c799dbff480e6651c2ef57c45c5513e481ee84418d1fb2d8d6aaffb8fbec9fa",
        },
    ]
}

/// Build and sign the item a vector describes.
pub fn item_from_vector(vector: &GoldenVector) -> DataItem {
    let signer = Ed25519Signer::from_secret_bytes(&vector.seed);
    let mut builder = DataItemBuilder::new(vector.data.to_vec())
        .tags(vector.tags.iter().map(|(n, v)| Tag::new(*n, *v)));
    if let Some(target) = vector.target {
        builder = builder.target(target.to_vec());
    }
    if let Some(anchor) = vector.anchor {
        builder = builder.anchor(anchor.to_vec());
    }
    builder.sign(&signer).expect("vector item signs")
}

/// Check every vector, returning `(name, matches, actual id hex)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let item = item_from_vector(v);
            let id = item.id().map(|id| id.to_hex()).unwrap_or_default();
            let envelope = encode(&item).map(hex::encode).unwrap_or_default();
            let matches = id == v.expected_id && envelope == v.expected_envelope;
            (v.name.to_string(), matches, id)
        })
        .collect()
}
