//! Tagged values carried through the clock objects.
//!
//! A [`TaggedValue`] is what the host hands to an object and what a queue
//! stores in its slots: a number, an interned [`Symbol`], or a reference to
//! host-owned state ([`ExternalBinding`]).

use crate::binding::ExternalBinding;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Name used by symbol slots that have not received a value yet.
pub const DEFAULT_SYMBOL: &str = "symbol";

#[derive(Default)]
struct Interner {
    names: Vec<Rc<str>>,
    ids: HashMap<Rc<str>, u32>,
}

impl Interner {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = u32::try_from(self.names.len()).unwrap_or(u32::MAX);
        let name: Rc<str> = Rc::from(name);
        self.names.push(Rc::clone(&name));
        self.ids.insert(name, id);
        id
    }
}

thread_local! {
    static INTERNER: RefCell<Interner> = RefCell::new(Interner::default());
}

/// An interned string identifier.
///
/// Symbols are `Copy` and compare by id. The table is per thread, which
/// matches the single-threaded scheduling model.
///
/// ```
/// use tempo_common::value::Symbol;
///
/// let a = Symbol::intern("x");
/// assert_eq!(a, Symbol::intern("x"));
/// assert_eq!(&*a.name(), "x");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

impl Symbol {
    /// Intern `name`, returning the existing id when already known.
    #[must_use]
    pub fn intern(name: &str) -> Self {
        Self(INTERNER.with(|table| table.borrow_mut().intern(name)))
    }

    /// The placeholder symbol used by fresh symbol slots.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::intern(DEFAULT_SYMBOL)
    }

    /// Resolve the symbol back to its text.
    #[must_use]
    pub fn name(&self) -> Rc<str> {
        INTERNER.with(|table| {
            table
                .borrow()
                .names
                .get(self.0 as usize)
                .cloned()
                .unwrap_or_else(|| Rc::from(""))
        })
    }

    /// Raw interned id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", &*self.name())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::intern(name)
    }
}

impl Serialize for Symbol {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(Self::intern(&name))
    }
}

/// Declared type of a queue slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// `f`: a 64-bit float.
    Number,
    /// `s`: an interned symbol.
    Symbol,
    /// `p`: a reference to host state.
    Reference,
}

impl SlotKind {
    /// Decode a descriptor by its leading character.
    ///
    /// Only the first character is significant, so `"float"` and `"f"` both
    /// declare a number slot.
    #[must_use]
    pub fn from_descriptor(descriptor: &str) -> Option<Self> {
        match descriptor.chars().next()? {
            'f' => Some(Self::Number),
            's' => Some(Self::Symbol),
            'p' => Some(Self::Reference),
            _ => None,
        }
    }

    /// The single-character tag for this kind.
    #[must_use]
    pub fn tag(&self) -> char {
        match self {
            Self::Number => 'f',
            Self::Symbol => 's',
            Self::Reference => 'p',
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number => write!(f, "number"),
            Self::Symbol => write!(f, "symbol"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

impl FromStr for SlotKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_descriptor(s).ok_or_else(|| s.to_string())
    }
}

/// A typed value: number, symbol, or external reference.
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    /// Numeric value.
    Number(f64),
    /// Interned symbol.
    Symbol(Symbol),
    /// Reference to host-owned state.
    Reference(ExternalBinding),
}

impl TaggedValue {
    /// Kind of this value.
    #[must_use]
    pub fn kind(&self) -> SlotKind {
        match self {
            Self::Number(_) => SlotKind::Number,
            Self::Symbol(_) => SlotKind::Symbol,
            Self::Reference(_) => SlotKind::Reference,
        }
    }

    /// Numeric view; anything that is not a number reads as 0.
    #[must_use]
    pub fn as_number(&self) -> f64 {
        match self {
            Self::Number(v) => *v,
            _ => 0.0,
        }
    }

    /// Symbol view; anything that is not a symbol reads as the placeholder.
    #[must_use]
    pub fn as_symbol(&self) -> Symbol {
        match self {
            Self::Symbol(s) => *s,
            _ => Symbol::placeholder(),
        }
    }

    /// Reference view, if this value is a reference.
    #[must_use]
    pub fn as_reference(&self) -> Option<&ExternalBinding> {
        match self {
            Self::Reference(binding) => Some(binding),
            _ => None,
        }
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Symbol(s) => write!(f, "{s}"),
            Self::Reference(binding) => write!(f, "{binding}"),
        }
    }
}

impl From<f64> for TaggedValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Symbol> for TaggedValue {
    fn from(value: Symbol) -> Self {
        Self::Symbol(value)
    }
}

impl From<&str> for TaggedValue {
    fn from(value: &str) -> Self {
        Self::Symbol(Symbol::intern(value))
    }
}

impl From<ExternalBinding> for TaggedValue {
    fn from(value: ExternalBinding) -> Self {
        Self::Reference(value)
    }
}
