/// A set of tags, one bit per configured tag label.
pub type TagMask = u32;

/// Index of a single tag (bit position).
pub type TagId = usize;

/// Number of tags a [TagMask] can address.
pub const MAX_TAGS: usize = TagMask::BITS as usize;

/// The mask holding only `tag`.
pub fn bit(tag: TagId) -> TagMask {
    debug_assert!(tag < MAX_TAGS);
    1 << tag
}

/// Mask with every configured tag set.
pub fn all(n_tags: usize) -> TagMask {
    if n_tags >= MAX_TAGS {
        TagMask::MAX
    } else {
        (1 << n_tags) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_covers_exactly_the_configured_tags() {
        assert_eq!(all(9), 0x1ff);
        assert_eq!(all(32), u32::MAX);
        assert_eq!(all(0), 0);
    }
}
