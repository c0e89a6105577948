//! The 8-byte slot encoding shared with the guest.
//!
//! A slot is either a plain IEEE-754 double or a NaN-boxed reference: the
//! high word is [`NAN_HEAD`] OR'd with a [`TypeTag`], the low word is the
//! handle. An all-zero slot is `undefined`, so a literal `0.0` number must
//! travel as a reference to the reserved zero handle instead.

/// High word shared by every boxed reference.
pub const NAN_HEAD: u32 = 0x7FF8_0000;

/// Type flag carried in the low bits of a boxed reference's high word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TypeTag {
    /// Numbers, booleans and `null` stored by handle.
    None = 0,
    /// Objects, arrays and byte arrays.
    Object = 1,
    /// Strings.
    String = 2,
    /// Symbols.
    Symbol = 3,
    /// Functions.
    Function = 4,
}

impl TypeTag {
    fn from_bits(bits: u32) -> Self {
        match bits {
            1 => Self::Object,
            2 => Self::String,
            3 => Self::Symbol,
            4 => Self::Function,
            _ => Self::None,
        }
    }

    /// The tag for a value's coarse `typeof` class.
    #[must_use]
    pub fn for_type_name(name: &str) -> Self {
        match name {
            "object" => Self::Object,
            "string" => Self::String,
            "symbol" => Self::Symbol,
            "function" => Self::Function,
            _ => Self::None,
        }
    }
}

/// A decoded slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    /// The all-zero pattern.
    Undefined,
    /// A non-zero, non-NaN double carried inline.
    Number(f64),
    /// A handle into the value table.
    Ref {
        /// Value table handle.
        id: u32,
        /// Type flag from the high word.
        tag: TypeTag,
    },
}

/// Encode a slot to its 64-bit wire form.
#[must_use]
pub fn encode(slot: Slot) -> u64 {
    match slot {
        Slot::Undefined => 0,
        Slot::Number(n) => n.to_bits(),
        Slot::Ref { id, tag } => (u64::from(NAN_HEAD | tag as u32) << 32) | u64::from(id),
    }
}

/// Decode a slot from its 64-bit wire form.
///
/// Any NaN pattern decodes as a reference: the guest never writes a bare
/// NaN, it refers to the reserved NaN handle instead.
#[must_use]
pub fn decode(bits: u64) -> Slot {
    let f = f64::from_bits(bits);
    // Both zeros: the guest only writes a bare zero for `undefined`.
    if f == 0.0 {
        return Slot::Undefined;
    }
    if !f.is_nan() {
        return Slot::Number(f);
    }
    #[allow(clippy::cast_possible_truncation)]
    let (high, low) = ((bits >> 32) as u32, bits as u32);
    Slot::Ref {
        id: low,
        tag: TypeTag::from_bits(high & 0x7),
    }
}
