//! Core Store Types, Identifiers, and Bit-Level Layouts
//!
//! This module defines the **fundamental identifiers, bit layouts, and
//! signatures** shared by every subsystem of the store: entity nodes,
//! archetypes, the structural change engine, command buffers and queries.
//!
//! ## Design Philosophy
//!
//! - **Dense storage** addressed by small copyable ids.
//! - **Bitset signatures** used directly as hash keys.
//! - **No heap allocation** for signature arithmetic.
//!
//! ## Signatures
//!
//! An archetype is identified by a [`Signature`]: one fixed-width bit vector
//! over registered component types and a parallel bit vector over tags. Both
//! widths are compile-time constants so a signature is a plain `Copy` value
//! that hashes and compares word by word.
//!
//! ```text
//! Signature { components: [u64; COMPONENT_WORDS], tags: [u64; TAG_WORDS] }
//! ```
//!
//! Set bits are always iterated in ascending id order. Event dispatch and
//! command playback rely on this to give a deterministic per-phase order.

/// Identifier for a registered component type.
pub type ComponentID = u16;
/// Identifier for a registered tag type.
pub type TagID = u16;
/// Identifier for a registered relation type.
pub type RelationID = u16;
/// Identifier for an archetype inside one store.
pub type ArchetypeID = u32;
/// Row index inside an archetype.
pub type RowID = u32;
/// Entity id (index into the node table). `0` is the null id.
pub type EntityID = u32;
/// Revision counter used to invalidate stale entity handles.
pub type Revision = u16;

/// Maximum number of registered component types per schema.
pub const COMPONENT_CAP: usize = 256;
/// Maximum number of registered tag types per schema.
pub const TAG_CAP: usize = 128;
/// Maximum number of registered relation types per schema.
pub const RELATION_CAP: usize = 64;

/// Number of `u64` words in a component bitset.
pub const COMPONENT_WORDS: usize = (COMPONENT_CAP + 63) / 64;
/// Number of `u64` words in a tag bitset.
pub const TAG_WORDS: usize = (TAG_CAP + 63) / 64;

/// The archetype holding entities without components or tags. Always exists.
pub const EMPTY_ARCHETYPE: ArchetypeID = 0;

/// Fixed-width bit vector of `W` 64-bit words.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BitSet<const W: usize> {
    words: [u64; W],
}

impl<const W: usize> Default for BitSet<W> {
    fn default() -> Self {
        Self { words: [0u64; W] }
    }
}

impl<const W: usize> BitSet<W> {
    /// Number of addressable bits.
    pub const CAPACITY: usize = W * 64;

    /// Creates an empty bitset.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bitset from a list of bit indices.
    pub fn from_ids(ids: &[u16]) -> Self {
        let mut set = Self::default();
        for &id in ids {
            set.set(id);
        }
        set
    }

    /// Sets bit `id`.
    #[inline]
    pub fn set(&mut self, id: u16) {
        let index = (id as usize) / 64;
        let bits = (id as usize) % 64;
        self.words[index] |= 1u64 << bits;
    }

    /// Clears bit `id`.
    #[inline]
    pub fn clear(&mut self, id: u16) {
        let index = (id as usize) / 64;
        let bits = (id as usize) % 64;
        self.words[index] &= !(1u64 << bits);
    }

    /// Returns `true` if bit `id` is set.
    #[inline]
    pub fn has(&self, id: u16) -> bool {
        let index = (id as usize) / 64;
        let bits = (id as usize) % 64;
        index < W && (self.words[index] >> bits) & 1 == 1
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Number of set bits.
    #[inline]
    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Returns `true` if every bit of `other` is also set in `self`.
    #[inline]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| (a & b) == *b)
    }

    /// Returns `true` if `self` and `other` share at least one bit.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| (a & b) != 0)
    }

    /// Bitwise union.
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for (word, other) in out.words.iter_mut().zip(other.words.iter()) {
            *word |= other;
        }
        out
    }

    /// Bitwise intersection.
    #[inline]
    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = *self;
        for (word, other) in out.words.iter_mut().zip(other.words.iter()) {
            *word &= other;
        }
        out
    }

    /// Bits set in `self` but not in `other`.
    #[inline]
    pub fn difference(&self, other: &Self) -> Self {
        let mut out = *self;
        for (word, other) in out.words.iter_mut().zip(other.words.iter()) {
            *word &= !other;
        }
        out
    }

    /// Iterates over set bit indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((base + tz) as u16)
                })
            })
    }

    /// Raw words, lowest bits first.
    #[inline]
    pub fn words(&self) -> &[u64; W] {
        &self.words
    }
}

/// Bitset over component ids.
pub type ComponentBits = BitSet<COMPONENT_WORDS>;
/// Bitset over tag ids.
pub type TagBits = BitSet<TAG_WORDS>;

/// Identity of an archetype: its component set plus its tag set.
///
/// Two signatures are equal iff both vectors are bit-identical.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Signature {
    /// Component types stored as columns.
    pub components: ComponentBits,
    /// Tags carried by every entity of the archetype.
    pub tags: TagBits,
}

impl Signature {
    /// Signature of the empty archetype.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if neither components nor tags are set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.tags.is_empty()
    }

    /// Applies a transition: `(self ∪ add) \ remove` on both vectors.
    ///
    /// Adding a bit already present or removing one already absent leaves it
    /// unchanged.
    pub fn transition(&self, change: &SignatureChange) -> Self {
        Self {
            components: self
                .components
                .union(&change.add_components)
                .difference(&change.remove_components),
            tags: self.tags.union(&change.add_tags).difference(&change.remove_tags),
        }
    }
}

/// Set of component and tag bits to add and to remove in one structural change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignatureChange {
    /// Components to add.
    pub add_components: ComponentBits,
    /// Components to remove.
    pub remove_components: ComponentBits,
    /// Tags to add.
    pub add_tags: TagBits,
    /// Tags to remove.
    pub remove_tags: TagBits,
}

impl SignatureChange {
    /// Returns `true` if the change carries no bits at all.
    pub fn is_empty(&self) -> bool {
        self.add_components.is_empty()
            && self.remove_components.is_empty()
            && self.add_tags.is_empty()
            && self.remove_tags.is_empty()
    }
}

/// Greatest common divisor, used for job "component multiple" computation.
pub(crate) const fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple; `lcm(0, x) == x`.
pub(crate) const fn lcm(a: usize, b: usize) -> usize {
    if a == 0 {
        return b;
    }
    if b == 0 {
        return a;
    }
    a / gcd(a, b) * b
}
