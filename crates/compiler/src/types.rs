//! Type registry for the tree IR
//!
//! All types live in a single [`Types`] registry and are referred to by
//! [`TypeId`]. Structural kinds (digits, pointers, arrays, closures and the
//! primitives) are deduplicated on construction, so for those kinds id
//! equality implies semantic equality. Nominal kinds (records, unions,
//! aliases) mint a fresh id every time; two records with the same fields are
//! still different types.
//!
//! Equality is structural after transparent aliases are folded away with
//! [`Types::follow`]. Opaque aliases are nominal: they never compare equal to
//! their target, but an explicit cast between the two is allowed.

use crate::tree::TreeId;
use num_bigint::BigInt;
use num_traits::{One, Zero};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Signedness of a digit type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Signed,
    Unsigned,
}

/// Width class of a digit type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Char,
    Short,
    Int,
    Long,
    Size,
    IntPtr,
    IntMax,
}

impl Width {
    /// Bit rank used for literal range checks and cast widening. The three
    /// target-word widths are treated as 64-bit here; the backend owns the
    /// true widths.
    pub fn bits(self) -> u32 {
        match self {
            Width::Char => 8,
            Width::Short => 16,
            Width::Int => 32,
            Width::Long | Width::Size | Width::IntPtr | Width::IntMax => 64,
        }
    }
}

/// Index of a type in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// The payload of a registered type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// The sentinel type carried by nodes that are themselves types
    Meta,
    /// The bottom type; never a value
    Empty,
    /// The type with exactly one value
    Unit,
    Bool,
    /// The absent result of a procedure
    Void,
    Digit {
        sign: Sign,
        width: Width,
    },
    String,
    Pointer {
        element: TypeId,
        /// May this pointer be indexed like an array?
        indexable: bool,
    },
    Array {
        element: TypeId,
        /// The length expression; array identity includes the length node
        length: TreeId,
    },
    Record {
        name: String,
        fields: Vec<(String, TypeId)>,
    },
    Union {
        name: String,
        fields: Vec<(String, TypeId)>,
    },
    Closure {
        params: Vec<(String, TypeId)>,
        result: TypeId,
        variadic: bool,
    },
    Alias {
        name: String,
        target: TypeId,
        /// Opaque aliases are nominal newtypes; transparent ones fold away
        opaque: bool,
    },
}

/// The type registry
pub struct Types {
    kinds: Vec<TypeKind>,
    dedup: HashMap<TypeKind, TypeId>,
    meta: TypeId,
    empty: TypeId,
    unit: TypeId,
    bool_t: TypeId,
    void_t: TypeId,
    string_t: TypeId,
}

impl Types {
    pub fn new() -> Self {
        let mut types = Types {
            kinds: Vec::new(),
            dedup: HashMap::new(),
            meta: TypeId(0),
            empty: TypeId(0),
            unit: TypeId(0),
            bool_t: TypeId(0),
            void_t: TypeId(0),
            string_t: TypeId(0),
        };
        types.meta = types.intern(TypeKind::Meta);
        types.empty = types.intern(TypeKind::Empty);
        types.unit = types.intern(TypeKind::Unit);
        types.bool_t = types.intern(TypeKind::Bool);
        types.void_t = types.intern(TypeKind::Void);
        types.string_t = types.intern(TypeKind::String);
        types
    }

    fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.dedup.get(&kind) {
            return id;
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.dedup.insert(kind, id);
        id
    }

    fn fresh(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind);
        id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.0 as usize]
    }

    // constructors

    pub fn meta(&self) -> TypeId {
        self.meta
    }

    pub fn empty(&self) -> TypeId {
        self.empty
    }

    pub fn unit(&self) -> TypeId {
        self.unit
    }

    pub fn bool_t(&self) -> TypeId {
        self.bool_t
    }

    pub fn void_t(&self) -> TypeId {
        self.void_t
    }

    pub fn string_t(&self) -> TypeId {
        self.string_t
    }

    pub fn digit(&mut self, sign: Sign, width: Width) -> TypeId {
        self.intern(TypeKind::Digit { sign, width })
    }

    pub fn pointer(&mut self, element: TypeId, indexable: bool) -> TypeId {
        self.intern(TypeKind::Pointer { element, indexable })
    }

    pub fn array(&mut self, element: TypeId, length: TreeId) -> TypeId {
        self.intern(TypeKind::Array { element, length })
    }

    pub fn closure(&mut self, params: Vec<(String, TypeId)>, result: TypeId, variadic: bool) -> TypeId {
        self.intern(TypeKind::Closure {
            params,
            result,
            variadic,
        })
    }

    pub fn record(&mut self, name: impl Into<String>, fields: Vec<(String, TypeId)>) -> TypeId {
        self.fresh(TypeKind::Record {
            name: name.into(),
            fields,
        })
    }

    pub fn union_t(&mut self, name: impl Into<String>, fields: Vec<(String, TypeId)>) -> TypeId {
        self.fresh(TypeKind::Union {
            name: name.into(),
            fields,
        })
    }

    pub fn alias(&mut self, name: impl Into<String>, target: TypeId, opaque: bool) -> TypeId {
        self.fresh(TypeKind::Alias {
            name: name.into(),
            target,
            opaque,
        })
    }

    // queries

    /// Peel transparent aliases; opaque aliases and every other kind are
    /// fixed points.
    pub fn follow(&self, id: TypeId) -> TypeId {
        let mut current = id;
        loop {
            match self.kind(current) {
                TypeKind::Alias {
                    target, opaque: false, ..
                } => current = *target,
                _ => return current,
            }
        }
    }

    /// Structural equality after transparent-alias folding
    pub fn equals(&self, a: TypeId, b: TypeId) -> bool {
        let a = self.follow(a);
        let b = self.follow(b);
        if a == b {
            return true;
        }
        match (self.kind(a), self.kind(b)) {
            (
                TypeKind::Pointer {
                    element: ea,
                    indexable: ia,
                },
                TypeKind::Pointer {
                    element: eb,
                    indexable: ib,
                },
            ) => ia == ib && self.equals(*ea, *eb),
            (
                TypeKind::Array {
                    element: ea,
                    length: la,
                },
                TypeKind::Array {
                    element: eb,
                    length: lb,
                },
            ) => la == lb && self.equals(*ea, *eb),
            (
                TypeKind::Closure {
                    params: pa,
                    result: ra,
                    variadic: va,
                },
                TypeKind::Closure {
                    params: pb,
                    result: rb,
                    variadic: vb,
                },
            ) => {
                va == vb
                    && pa.len() == pb.len()
                    && self.equals(*ra, *rb)
                    && pa
                        .iter()
                        .zip(pb.iter())
                        .all(|((_, ta), (_, tb))| self.equals(*ta, *tb))
            }
            // structural leaves are interned (id inequality is real) and
            // nominal kinds compare by id only
            _ => false,
        }
    }

    /// May a value of `src` be stored where a `dst` is expected?
    pub fn assignable(&self, dst: TypeId, src: TypeId) -> bool {
        self.equals(dst, src)
    }

    /// Is an explicit cast from `from` to `to` permitted?
    ///
    /// Casts allow digit widening with unchanged sign, any pointer to any
    /// pointer, and unwrapping or wrapping an opaque alias.
    pub fn castable(&self, from: TypeId, to: TypeId) -> bool {
        if self.equals(from, to) {
            return true;
        }
        // opaque alias <-> target, both directions
        if let TypeKind::Alias {
            target, opaque: true, ..
        } = self.kind(from)
            && self.equals(*target, to)
        {
            return true;
        }
        if let TypeKind::Alias {
            target, opaque: true, ..
        } = self.kind(to)
            && self.equals(from, *target)
        {
            return true;
        }
        let from = self.follow(from);
        let to = self.follow(to);
        match (self.kind(from), self.kind(to)) {
            (
                TypeKind::Digit {
                    sign: sa,
                    width: wa,
                },
                TypeKind::Digit {
                    sign: sb,
                    width: wb,
                },
            ) => sa == sb && wb.bits() >= wa.bits(),
            (TypeKind::Pointer { .. }, TypeKind::Pointer { .. }) => true,
            _ => false,
        }
    }

    pub fn is_digit(&self, id: TypeId) -> bool {
        matches!(self.kind(self.follow(id)), TypeKind::Digit { .. })
    }

    pub fn is_bool(&self, id: TypeId) -> bool {
        matches!(self.kind(self.follow(id)), TypeKind::Bool)
    }

    /// Does a function with this result type return no value?
    pub fn is_unit_result(&self, id: TypeId) -> bool {
        matches!(self.kind(self.follow(id)), TypeKind::Unit | TypeKind::Void)
    }

    pub fn as_closure(&self, id: TypeId) -> Option<(&[(String, TypeId)], TypeId, bool)> {
        match self.kind(self.follow(id)) {
            TypeKind::Closure {
                params,
                result,
                variadic,
            } => Some((params.as_slice(), *result, *variadic)),
            _ => None,
        }
    }

    /// Does `value` fit in the given digit description?
    pub fn digit_fits(&self, value: &BigInt, sign: Sign, width: Width) -> bool {
        let bits = width.bits();
        match sign {
            Sign::Unsigned => {
                let limit = BigInt::one() << bits;
                *value >= BigInt::zero() && *value < limit
            }
            Sign::Signed => {
                let limit = BigInt::one() << (bits - 1);
                *value >= -limit.clone() && *value < limit
            }
        }
    }

    /// Human-readable rendering for diagnostics
    pub fn display(&self, id: TypeId) -> String {
        match self.kind(id) {
            TypeKind::Meta => "type".to_string(),
            TypeKind::Empty => "empty".to_string(),
            TypeKind::Unit => "unit".to_string(),
            TypeKind::Bool => "bool".to_string(),
            TypeKind::Void => "void".to_string(),
            TypeKind::String => "str".to_string(),
            TypeKind::Digit { sign, width } => digit_name(*sign, *width).to_string(),
            TypeKind::Pointer { element, indexable } => {
                let prefix = if *indexable { "[*]" } else { "*" };
                format!("{}{}", prefix, self.display(*element))
            }
            TypeKind::Array { element, .. } => format!("[]{}", self.display(*element)),
            TypeKind::Record { name, .. } => format!("record {}", name),
            TypeKind::Union { name, .. } => format!("union {}", name),
            TypeKind::Closure {
                params,
                result,
                variadic,
            } => {
                let mut out = String::from("def(");
                for (i, (_, ty)) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.display(*ty));
                }
                if *variadic {
                    if !params.is_empty() {
                        out.push_str(", ");
                    }
                    out.push_str("...");
                }
                let _ = write!(out, ") -> {}", self.display(*result));
                out
            }
            TypeKind::Alias { name, .. } => name.clone(),
        }
    }
}

impl Default for Types {
    fn default() -> Self {
        Types::new()
    }
}

/// Canonical display name of a digit description
pub fn digit_name(sign: Sign, width: Width) -> &'static str {
    match (sign, width) {
        (Sign::Signed, Width::Char) => "char",
        (Sign::Unsigned, Width::Char) => "uchar",
        (Sign::Signed, Width::Short) => "short",
        (Sign::Unsigned, Width::Short) => "ushort",
        (Sign::Signed, Width::Int) => "int",
        (Sign::Unsigned, Width::Int) => "uint",
        (Sign::Signed, Width::Long) => "long",
        (Sign::Unsigned, Width::Long) => "ulong",
        (Sign::Signed, Width::Size) => "ssize",
        (Sign::Unsigned, Width::Size) => "size",
        (Sign::Signed, Width::IntPtr) => "intptr",
        (Sign::Unsigned, Width::IntPtr) => "uintptr",
        (Sign::Signed, Width::IntMax) => "intmax",
        (Sign::Unsigned, Width::IntMax) => "uintmax",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_types_are_deduplicated() {
        let mut types = Types::new();
        let a = types.digit(Sign::Signed, Width::Int);
        let b = types.digit(Sign::Signed, Width::Int);
        assert_eq!(a, b);

        let pa = types.pointer(a, false);
        let pb = types.pointer(b, false);
        assert_eq!(pa, pb);

        let ca = types.closure(vec![("v".into(), a)], a, false);
        let cb = types.closure(vec![("v".into(), a)], a, false);
        assert_eq!(ca, cb);
    }

    #[test]
    fn test_nominal_types_are_never_deduplicated() {
        let mut types = Types::new();
        let int = types.digit(Sign::Signed, Width::Int);
        let a = types.record("pair", vec![("x".into(), int), ("y".into(), int)]);
        let b = types.record("pair", vec![("x".into(), int), ("y".into(), int)]);
        assert_ne!(a, b);
        assert!(!types.equals(a, b));
        assert!(types.equals(a, a));
    }

    #[test]
    fn test_transparent_alias_folds_on_equality() {
        let mut types = Types::new();
        let int = types.digit(Sign::Signed, Width::Int);
        let transparent = types.alias("rune", int, false);
        let opaque = types.alias("handle", int, true);
        assert!(types.equals(transparent, int));
        assert!(!types.equals(opaque, int));
        assert_eq!(types.follow(transparent), int);
        assert_eq!(types.follow(opaque), opaque);
    }

    #[test]
    fn test_distinct_opaque_aliases_differ() {
        let mut types = Types::new();
        let int = types.digit(Sign::Signed, Width::Int);
        let a = types.alias("fd", int, true);
        let b = types.alias("fd", int, true);
        assert!(!types.equals(a, b));
    }

    #[test]
    fn test_closure_equality_peels_parameter_aliases() {
        let mut types = Types::new();
        let int = types.digit(Sign::Signed, Width::Int);
        let rune = types.alias("rune", int, false);
        let a = types.closure(vec![("v".into(), int)], int, false);
        let b = types.closure(vec![("w".into(), rune)], rune, false);
        assert_ne!(a, b);
        assert!(types.equals(a, b));
    }

    #[test]
    fn test_closure_equality_requires_arity_and_variadic() {
        let mut types = Types::new();
        let int = types.digit(Sign::Signed, Width::Int);
        let one = types.closure(vec![("v".into(), int)], int, false);
        let two = types.closure(vec![("v".into(), int), ("w".into(), int)], int, false);
        let var = types.closure(vec![("v".into(), int)], int, true);
        assert!(!types.equals(one, two));
        assert!(!types.equals(one, var));
    }

    #[test]
    fn test_cast_rules() {
        let mut types = Types::new();
        let short = types.digit(Sign::Signed, Width::Short);
        let int = types.digit(Sign::Signed, Width::Int);
        let uint = types.digit(Sign::Unsigned, Width::Int);
        assert!(types.castable(short, int));
        assert!(!types.castable(int, short));
        assert!(!types.castable(int, uint));

        let pi = types.pointer(int, false);
        let ps = types.pointer(short, true);
        assert!(types.castable(pi, ps));
        assert!(!types.castable(int, pi));

        let handle = types.alias("handle", int, true);
        assert!(types.castable(handle, int));
        assert!(types.castable(int, handle));
        assert!(!types.castable(handle, short));
    }

    #[test]
    fn test_digit_literal_bounds() {
        let types = Types::new();
        assert!(types.digit_fits(&BigInt::from(255), Sign::Unsigned, Width::Char));
        assert!(!types.digit_fits(&BigInt::from(256), Sign::Unsigned, Width::Char));
        assert!(types.digit_fits(&BigInt::from(-128), Sign::Signed, Width::Char));
        assert!(!types.digit_fits(&BigInt::from(-129), Sign::Signed, Width::Char));
        assert!(!types.digit_fits(&BigInt::from(-1), Sign::Unsigned, Width::Char));
    }

    #[test]
    fn test_display() {
        let mut types = Types::new();
        let int = types.digit(Sign::Signed, Width::Int);
        let ptr = types.pointer(int, true);
        assert_eq!(types.display(int), "int");
        assert_eq!(types.display(ptr), "[*]int");
        let sig = types.closure(vec![("v".into(), int)], int, true);
        assert_eq!(types.display(sig), "def(int, ...) -> int");
    }
}
