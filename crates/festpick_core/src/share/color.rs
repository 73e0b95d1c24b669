//! Color assignment seam for newly imported profiles.

/// Keyed color allocator. Only consulted for brand-new profiles.
pub trait ColorAllocator: Send + Sync {
    fn color_for(&self, identity: &str) -> String;
}

const PALETTE: &[&str] = &[
    "#E57373", "#64B5F6", "#81C784", "#FFB74D", "#BA68C8", "#4DD0E1", "#F06292", "#AED581",
];

/// Picks a palette entry from a stable hash of the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaletteColorAllocator;

impl ColorAllocator for PaletteColorAllocator {
    fn color_for(&self, identity: &str) -> String {
        // FNV-1a: stable across processes and platforms.
        let hash = identity.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |acc, byte| {
            (acc ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        });
        let index = usize::try_from(hash % PALETTE.len() as u64).unwrap_or(0);
        PALETTE[index].to_string()
    }
}
