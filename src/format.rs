//! Caps: format descriptor sets and their algebra.
//!
//! Caps describe what data a pad can carry. They are an ordered list of
//! alternative [`Structure`]s (first is preferred), or the special ANY value.
//! A structure is a media type name plus named fields whose [`Value`]s can be
//! fixed, a range, or a list of alternatives.
//!
//! # Caps Negotiation
//!
//! - [`Caps::intersect`]: common ground between two descriptors
//! - [`Caps::is_subset`]: containment test
//! - [`Caps::is_fixed`]: exactly one structure with only concrete values
//! - [`Caps::fixate_nearest`]: deterministic reduction to a fixed format
//!
//! ```rust
//! use parallax_transform::format::{Caps, Structure};
//!
//! let template = Caps::builder("audio/x-raw")
//!     .field("rate", 8000..=48000)
//!     .field("channels", vec![2, 1])
//!     .build();
//! let input = Caps::builder("audio/x-raw")
//!     .field("rate", 44100)
//!     .field("channels", 2)
//!     .build();
//!
//! let common = template.intersect(&input);
//! assert!(common.is_fixed());
//! assert!(input.is_subset(&template));
//! ```
//!
//! Caps are immutable once shared: clones share storage and mutation goes
//! through [`Caps::make_mut`], which copies on write.

use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

// ============================================================================
// Fraction
// ============================================================================

/// A rational number, e.g. a framerate.
///
/// Equality and ordering compare the rational value, so `1/2 == 2/4`.
#[derive(Clone, Copy, Debug)]
pub struct Fraction {
    num: i32,
    den: i32,
}

impl Fraction {
    /// Create a fraction; the sign is moved to the numerator.
    ///
    /// # Panics
    ///
    /// Panics if `den` is zero.
    pub const fn new(num: i32, den: i32) -> Self {
        assert!(den != 0, "fraction denominator must not be zero");
        if den < 0 {
            Self { num: -num, den: -den }
        } else {
            Self { num, den }
        }
    }

    /// Numerator.
    #[inline]
    pub const fn numer(self) -> i32 {
        self.num
    }

    /// Denominator (always positive).
    #[inline]
    pub const fn denom(self) -> i32 {
        self.den
    }
}

impl PartialEq for Fraction {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Fraction {}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num as i64 * other.den as i64).cmp(&(other.num as i64 * self.den as i64))
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

// ============================================================================
// Value
// ============================================================================

/// A field value: fixed, a range, or a list of alternatives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// Fixed integer.
    Int(i64),
    /// Inclusive integer range.
    IntRange {
        /// Minimum acceptable value.
        min: i64,
        /// Maximum acceptable value.
        max: i64,
    },
    /// Fixed fraction.
    Fraction(Fraction),
    /// Inclusive fraction range.
    FractionRange {
        /// Minimum acceptable value.
        min: Fraction,
        /// Maximum acceptable value.
        max: Fraction,
    },
    /// Fixed boolean.
    Bool(bool),
    /// Fixed string.
    Str(String),
    /// Ordered alternatives (first is preferred).
    List(Vec<Value>),
}

/// Largest integer range that subset tests expand against a list.
const MAX_EXPANDED_RANGE: i64 = 64;

impl Value {
    /// Build a list value, collapsing a single alternative.
    pub fn list(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        Self::from_alternatives(items).unwrap_or(Self::List(Vec::new()))
    }

    fn from_alternatives(mut items: Vec<Value>) -> Option<Self> {
        match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Self::List(items)),
        }
    }

    fn alternatives(&self) -> &[Value] {
        match self {
            Self::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }

    /// Whether this is a single concrete value.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        matches!(
            self,
            Self::Int(_) | Self::Fraction(_) | Self::Bool(_) | Self::Str(_)
        )
    }

    /// Intersect two values, `None` if they share nothing.
    ///
    /// Alternatives keep the order of `self`.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let mut out: Vec<Value> = Vec::new();
        for a in self.alternatives() {
            for b in other.alternatives() {
                if let Some(v) = intersect_single(a, b) {
                    if !out.contains(&v) {
                        out.push(v);
                    }
                }
            }
        }
        Self::from_alternatives(out)
    }

    /// Whether every value accepted by `self` is accepted by `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.alternatives().iter().all(|a| single_is_subset(a, other))
    }

    /// Default fixation: minimum of a range, first entry of a list.
    pub fn fixate(&self) -> Self {
        match self {
            Self::IntRange { min, .. } => Self::Int(*min),
            Self::FractionRange { min, .. } => Self::Fraction(*min),
            Self::List(items) => items.first().map_or_else(|| self.clone(), Self::fixate),
            fixed => fixed.clone(),
        }
    }

    /// Fixate towards `target`: a range takes the accepted value nearest
    /// it, anything else its default.
    ///
    /// Lists always take their first alternative, whatever the target.
    pub fn fixate_nearest(&self, target: &Self) -> Self {
        match (self, target) {
            (Self::IntRange { min, max }, Self::Int(t)) => Self::Int((*t).clamp(*min, *max)),
            (Self::FractionRange { min, max }, Self::Fraction(t)) => {
                Self::Fraction((*t).clamp(*min, *max))
            }
            _ => self.fixate(),
        }
    }
}

fn int_range(min: i64, max: i64) -> Option<Value> {
    match min.cmp(&max) {
        Ordering::Less => Some(Value::IntRange { min, max }),
        Ordering::Equal => Some(Value::Int(min)),
        Ordering::Greater => None,
    }
}

fn fraction_range(min: Fraction, max: Fraction) -> Option<Value> {
    match min.cmp(&max) {
        Ordering::Less => Some(Value::FractionRange { min, max }),
        Ordering::Equal => Some(Value::Fraction(min)),
        Ordering::Greater => None,
    }
}

fn intersect_single(a: &Value, b: &Value) -> Option<Value> {
    use Value::*;
    match (a, b) {
        (Int(x), Int(y)) => (x == y).then_some(Int(*x)),
        (Int(x), IntRange { min, max }) | (IntRange { min, max }, Int(x)) => {
            (min <= x && x <= max).then_some(Int(*x))
        }
        (IntRange { min: a0, max: a1 }, IntRange { min: b0, max: b1 }) => {
            int_range(*a0.max(b0), *a1.min(b1))
        }
        (Fraction(x), Fraction(y)) => (x == y).then_some(Fraction(*x)),
        (Fraction(x), FractionRange { min, max }) | (FractionRange { min, max }, Fraction(x)) => {
            (min <= x && x <= max).then_some(Fraction(*x))
        }
        (FractionRange { min: a0, max: a1 }, FractionRange { min: b0, max: b1 }) => {
            fraction_range(*a0.max(b0), *a1.min(b1))
        }
        (Bool(x), Bool(y)) => (x == y).then_some(Bool(*x)),
        (Str(x), Str(y)) => (x == y).then(|| Str(x.clone())),
        _ => None,
    }
}

fn single_within(a: &Value, b: &Value) -> bool {
    use Value::*;
    match (a, b) {
        (Int(x), Int(y)) => x == y,
        (Int(x), IntRange { min, max }) => min <= x && x <= max,
        (IntRange { min: a0, max: a1 }, IntRange { min: b0, max: b1 }) => b0 <= a0 && a1 <= b1,
        (IntRange { min, max }, Int(y)) => min == y && max == y,
        (Fraction(x), Fraction(y)) => x == y,
        (Fraction(x), FractionRange { min, max }) => min <= x && x <= max,
        (FractionRange { min: a0, max: a1 }, FractionRange { min: b0, max: b1 }) => {
            b0 <= a0 && a1 <= b1
        }
        (FractionRange { min, max }, Fraction(y)) => min == y && max == y,
        (Bool(x), Bool(y)) => x == y,
        (Str(x), Str(y)) => x == y,
        _ => false,
    }
}

fn single_is_subset(a: &Value, other: &Value) -> bool {
    if other.alternatives().iter().any(|b| single_within(a, b)) {
        return true;
    }
    // A small range may still be covered piecewise by a list.
    if let Value::IntRange { min, max } = a {
        if max.checked_sub(*min).is_some_and(|width| width < MAX_EXPANDED_RANGE) {
            return (*min..=*max).all(|i| {
                other
                    .alternatives()
                    .iter()
                    .any(|b| single_within(&Value::Int(i), b))
            });
        }
    }
    false
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "(int){v}"),
            Self::IntRange { min, max } => write!(f, "(int)[ {min}, {max} ]"),
            Self::Fraction(v) => write!(f, "(fraction){v}"),
            Self::FractionRange { min, max } => write!(f, "(fraction)[ {min}, {max} ]"),
            Self::Bool(v) => write!(f, "(boolean){v}"),
            Self::Str(v) => write!(f, "(string){v}"),
            Self::List(items) => {
                write!(f, "{{ ")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Fraction> for Value {
    fn from(v: Fraction) -> Self {
        Self::Fraction(v)
    }
}

impl From<RangeInclusive<i64>> for Value {
    fn from(range: RangeInclusive<i64>) -> Self {
        let (min, max) = range.into_inner();
        Self::IntRange { min, max }
    }
}

impl From<RangeInclusive<i32>> for Value {
    fn from(range: RangeInclusive<i32>) -> Self {
        let (min, max) = range.into_inner();
        Self::IntRange {
            min: min.into(),
            max: max.into(),
        }
    }
}

impl From<RangeInclusive<Fraction>> for Value {
    fn from(range: RangeInclusive<Fraction>) -> Self {
        let (min, max) = range.into_inner();
        Self::FractionRange { min, max }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::list(values)
    }
}

// ============================================================================
// Structure
// ============================================================================

/// One alternative within caps: a media type plus named field constraints.
///
/// A field missing from a structure is unconstrained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Structure {
    name: String,
    fields: SmallVec<[(String, Value); 4]>,
}

impl Structure {
    /// Create a structure with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: SmallVec::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Media type name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set or replace a field, keeping its position if it exists.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == field) {
            Some((_, v)) => *v = value,
            None => self.fields.push((field, value)),
        }
    }

    /// Get a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }

    /// Get a fixed integer field.
    pub fn get_int(&self, field: &str) -> Option<i64> {
        match self.get(field)? {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get a fixed string field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        match self.get(field)? {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Get a fixed fraction field.
    pub fn get_fraction(&self, field: &str) -> Option<Fraction> {
        match self.get(field)? {
            Value::Fraction(v) => Some(*v),
            _ => None,
        }
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(k, _)| k == field)?;
        Some(self.fields.remove(idx).1)
    }

    /// Whether the field is present.
    pub fn has_field(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Iterate over fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether every field holds a single concrete value.
    pub fn is_fixed(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_fixed())
    }

    /// Intersect with another structure; fields present on only one side
    /// are carried over unchanged.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if self.name != other.name {
            return None;
        }
        let mut out = Self::new(self.name.clone());
        for (k, v) in &self.fields {
            let merged = match other.get(k) {
                Some(ov) => v.intersect(ov)?,
                None => v.clone(),
            };
            out.fields.push((k.clone(), merged));
        }
        for (k, v) in &other.fields {
            if !self.has_field(k) {
                out.fields.push((k.clone(), v.clone()));
            }
        }
        Some(out)
    }

    /// Whether the structures share at least one format.
    pub fn can_intersect(&self, other: &Self) -> bool {
        self.intersect(other).is_some()
    }

    /// Whether every format described by `self` is described by `superset`.
    pub fn is_subset(&self, superset: &Self) -> bool {
        self.name == superset.name
            && superset
                .fields
                .iter()
                .all(|(k, sv)| self.get(k).is_some_and(|v| v.is_subset(sv)))
    }

    /// Fixate every field to its default.
    pub fn fixate(&mut self) {
        for (_, v) in self.fields.iter_mut() {
            if !v.is_fixed() {
                *v = v.fixate();
            }
        }
    }

    /// Fixate every open field. A range moves to the value nearest the
    /// fixed number of the same name in `reference`; lists and unmatched
    /// ranges take their default.
    pub fn fixate_nearest(&mut self, reference: Option<&Structure>) {
        for (k, v) in self.fields.iter_mut() {
            if v.is_fixed() {
                continue;
            }
            *v = match reference.and_then(|r| r.get(k)) {
                Some(target) => v.fixate_nearest(target),
                None => v.fixate(),
            };
        }
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (k, v) in &self.fields {
            write!(f, ", {k}={v}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Caps
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
struct CapsInner {
    any: bool,
    structures: SmallVec<[Structure; 1]>,
}

/// Format descriptor set: ordered alternative structures, or ANY.
///
/// Cloning is an `Arc` increment. Two clones are the *same instance* for
/// [`Caps::ptr_eq`] until one of them is mutated.
#[derive(Clone)]
pub struct Caps(Arc<CapsInner>);

/// Builder for single-structure caps.
#[derive(Debug)]
pub struct CapsBuilder {
    structure: Structure,
}

impl CapsBuilder {
    /// Add a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.structure.set(name, value);
        self
    }

    /// Finish the caps.
    pub fn build(self) -> Caps {
        Caps::new(self.structure)
    }
}

impl Caps {
    fn from_inner(any: bool, structures: SmallVec<[Structure; 1]>) -> Self {
        Self(Arc::new(CapsInner { any, structures }))
    }

    /// Caps that accept anything.
    pub fn new_any() -> Self {
        Self::from_inner(true, SmallVec::new())
    }

    /// Caps that accept nothing.
    pub fn new_empty() -> Self {
        Self::from_inner(false, SmallVec::new())
    }

    /// Caps with a single structure.
    pub fn new(structure: Structure) -> Self {
        Self::from_inner(false, smallvec::smallvec![structure])
    }

    /// Caps with several alternatives, first preferred.
    pub fn from_structures(structures: impl IntoIterator<Item = Structure>) -> Self {
        Self::from_inner(false, structures.into_iter().collect())
    }

    /// Start building single-structure caps.
    pub fn builder(name: impl Into<String>) -> CapsBuilder {
        CapsBuilder {
            structure: Structure::new(name),
        }
    }

    /// Is this ANY?
    #[inline]
    pub fn is_any(&self) -> bool {
        self.0.any
    }

    /// Does this accept nothing?
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.0.any && self.0.structures.is_empty()
    }

    /// Exactly one structure and every field concrete.
    pub fn is_fixed(&self) -> bool {
        !self.0.any && self.0.structures.len() == 1 && self.0.structures[0].is_fixed()
    }

    /// Number of structures (zero for ANY).
    #[inline]
    pub fn len(&self) -> usize {
        self.0.structures.len()
    }

    /// Get a structure by index.
    pub fn structure(&self, idx: usize) -> Option<&Structure> {
        self.0.structures.get(idx)
    }

    /// Iterate over structures in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &Structure> {
        self.0.structures.iter()
    }

    /// Mutable access to the structures, copying if the caps are shared.
    pub fn make_mut(&mut self) -> &mut SmallVec<[Structure; 1]> {
        &mut Arc::make_mut(&mut self.0).structures
    }

    /// Whether `a` and `b` are the same instance.
    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Intersection, in the preference order of `self`.
    pub fn intersect(&self, other: &Self) -> Self {
        if self.is_any() {
            return other.clone();
        }
        if other.is_any() {
            return self.clone();
        }
        let mut out: SmallVec<[Structure; 1]> = SmallVec::new();
        for a in self.iter() {
            for b in other.iter() {
                if let Some(s) = a.intersect(b) {
                    if !out.iter().any(|o| s.is_subset(o)) {
                        out.push(s);
                    }
                }
            }
        }
        Self::from_inner(false, out)
    }

    /// Whether the caps share at least one format.
    pub fn can_intersect(&self, other: &Self) -> bool {
        if self.is_any() || other.is_any() {
            return !self.is_empty() && !other.is_empty();
        }
        self.iter().any(|a| other.iter().any(|b| a.can_intersect(b)))
    }

    /// Whether every format in `self` is also in `superset`.
    pub fn is_subset(&self, superset: &Self) -> bool {
        if superset.is_any() {
            return true;
        }
        if self.is_any() {
            return false;
        }
        self.iter()
            .all(|s| superset.iter().any(|sup| s.is_subset(sup)))
    }

    /// Semantic equality: mutual containment.
    pub fn is_equal(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other) || (self.is_subset(other) && other.is_subset(self))
    }

    /// Keep only the first structure.
    pub fn truncate(mut self) -> Self {
        if self.len() > 1 {
            self.make_mut().truncate(1);
        }
        self
    }

    /// Append the structures of `other` that `self` does not already cover.
    pub fn merge(mut self, other: Self) -> Self {
        if self.is_any() {
            return self;
        }
        if other.is_any() {
            return other;
        }
        for s in other.iter() {
            if !self.iter().any(|existing| s.is_subset(existing)) {
                self.make_mut().push(s.clone());
            }
        }
        self
    }

    /// Default fixation: first structure, every field at its default.
    pub fn fixate(self) -> Self {
        self.fixate_with(|s| s.fixate())
    }

    /// Default negotiation policy: first structure, open ranges nearest the
    /// matching fixed fields of `reference`'s first structure.
    pub fn fixate_nearest(self, reference: &Caps) -> Self {
        let reference = reference.structure(0);
        self.fixate_with(|s| s.fixate_nearest(reference))
    }

    fn fixate_with(self, f: impl FnOnce(&mut Structure)) -> Self {
        if self.is_any() || self.is_empty() || self.is_fixed() {
            return self;
        }
        let mut caps = self.truncate();
        if let Some(s) = caps.make_mut().first_mut() {
            f(s);
        }
        caps
    }
}

impl PartialEq for Caps {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other) || self.0 == other.0
    }
}

impl Eq for Caps {}

impl From<Structure> for Caps {
    fn from(structure: Structure) -> Self {
        Self::new(structure)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "ANY");
        }
        if self.is_empty() {
            return write!(f, "EMPTY");
        }
        for (i, s) in self.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{s}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Caps({self})")
    }
}
