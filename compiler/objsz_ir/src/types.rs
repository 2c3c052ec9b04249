//! Type layouts for declared objects and access paths.
//!
//! The analysis only needs byte-level facts about types: total size,
//! field offsets, array strides and the known element count. Types are
//! interned in a [`TypeTable`] and referenced by [`TypeId`].

use smallvec::SmallVec;

/// Index into a [`TypeTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    /// Create a new type ID from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A member of a record or union.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    /// Byte offset from the start of the enclosing aggregate.
    pub offset: u64,
    pub ty: TypeId,
}

/// Shape of a type, as far as byte layout is concerned.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Any non-aggregate of a fixed size (integers, pointers, floats).
    Scalar { size: u64 },
    /// `elem[len]`. `len == None` has no static extent (flexible array
    /// member, `extern char a[]`, variable-length array).
    Array { elem: TypeId, len: Option<u64> },
    /// A struct. `size` includes tail padding.
    Record {
        size: u64,
        fields: SmallVec<[Field; 4]>,
    },
    /// A union. Every member sits at offset 0.
    Union {
        size: u64,
        fields: SmallVec<[Field; 4]>,
    },
    /// `_Complex part`: real half followed by the imaginary half.
    Complex { part: TypeId },
}

/// Interned type layouts for one module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeTable {
    kinds: Vec<TypeKind>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a type and return its ID.
    pub fn push(&mut self, kind: TypeKind) -> TypeId {
        let id = u32::try_from(self.kinds.len())
            .unwrap_or_else(|_| panic!("type count exceeds u32::MAX"));
        self.kinds.push(kind);
        TypeId::new(id)
    }

    pub fn scalar(&mut self, size: u64) -> TypeId {
        self.push(TypeKind::Scalar { size })
    }

    pub fn array(&mut self, elem: TypeId, len: Option<u64>) -> TypeId {
        self.push(TypeKind::Array { elem, len })
    }

    pub fn complex(&mut self, part: TypeId) -> TypeId {
        self.push(TypeKind::Complex { part })
    }

    /// Lay out a record with natural alignment, the way a C compiler would
    /// for a target where every scalar is aligned to its own size.
    ///
    /// Returns the record type; field offsets are recorded on the fields.
    pub fn record(&mut self, fields: &[(&str, TypeId)]) -> TypeId {
        let mut offset = 0u64;
        let mut max_align = 1u64;
        let mut laid_out = SmallVec::new();
        for &(name, ty) in fields {
            let align = self.align_of(ty);
            max_align = max_align.max(align);
            offset = offset.next_multiple_of(align);
            laid_out.push(Field {
                name: name.to_owned(),
                offset,
                ty,
            });
            offset += self.size_of(ty).unwrap_or(0);
        }
        let size = offset.next_multiple_of(max_align);
        self.push(TypeKind::Record {
            size,
            fields: laid_out,
        })
    }

    /// Lay out a union: every member at offset 0, size of the largest.
    pub fn union(&mut self, fields: &[(&str, TypeId)]) -> TypeId {
        let mut size = 0u64;
        let mut max_align = 1u64;
        let mut laid_out = SmallVec::new();
        for &(name, ty) in fields {
            max_align = max_align.max(self.align_of(ty));
            size = size.max(self.size_of(ty).unwrap_or(0));
            laid_out.push(Field {
                name: name.to_owned(),
                offset: 0,
                ty,
            });
        }
        self.push(TypeKind::Union {
            size: size.next_multiple_of(max_align),
            fields: laid_out,
        })
    }

    /// Look up a type. Returns `None` for IDs not in this table.
    #[inline]
    pub fn get(&self, ty: TypeId) -> Option<&TypeKind> {
        self.kinds.get(ty.index())
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Static extent of `ty` in bytes, or `None` if it has none.
    ///
    /// An element chain that revisits a type (only possible in a
    /// malformed table) has no extent either.
    pub fn size_of(&self, ty: TypeId) -> Option<u64> {
        let mut count = 1u64;
        let mut cur = ty;
        for _ in 0..=self.kinds.len() {
            match self.get(cur)? {
                TypeKind::Scalar { size }
                | TypeKind::Record { size, .. }
                | TypeKind::Union { size, .. } => return size.checked_mul(count),
                TypeKind::Array { elem, len } => {
                    count = count.checked_mul((*len)?)?;
                    cur = *elem;
                }
                TypeKind::Complex { part } => {
                    count = count.checked_mul(2)?;
                    cur = *part;
                }
            }
        }
        None
    }

    /// Alignment used by [`record`](Self::record) layout.
    fn align_of(&self, ty: TypeId) -> u64 {
        self.align_within(ty, self.kinds.len())
    }

    /// `align_of`, giving up with 1 after `depth` nested types.
    fn align_within(&self, ty: TypeId, depth: usize) -> u64 {
        let Some(depth) = depth.checked_sub(1) else {
            return 1;
        };
        match self.get(ty) {
            Some(TypeKind::Scalar { size }) => (*size).max(1),
            Some(TypeKind::Array { elem: inner, .. } | TypeKind::Complex { part: inner }) => {
                self.align_within(*inner, depth)
            }
            Some(TypeKind::Record { fields, .. } | TypeKind::Union { fields, .. }) => fields
                .iter()
                .map(|f| self.align_within(f.ty, depth))
                .max()
                .unwrap_or(1),
            None => 1,
        }
    }

    /// Types referenced directly by `ty`: element, part or member types.
    pub fn components(&self, ty: TypeId) -> SmallVec<[TypeId; 4]> {
        match self.get(ty) {
            Some(TypeKind::Array { elem: inner, .. } | TypeKind::Complex { part: inner }) => {
                smallvec::smallvec![*inner]
            }
            Some(TypeKind::Record { fields, .. } | TypeKind::Union { fields, .. }) => {
                fields.iter().map(|f| f.ty).collect()
            }
            Some(TypeKind::Scalar { .. }) | None => SmallVec::new(),
        }
    }

    /// Members of a record or union, or `None` for other kinds.
    pub fn fields(&self, ty: TypeId) -> Option<&[Field]> {
        match self.get(ty)? {
            TypeKind::Record { fields, .. } | TypeKind::Union { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn is_union(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Some(TypeKind::Union { .. }))
    }

    pub fn is_record(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Some(TypeKind::Record { .. }))
    }

    pub fn is_array(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Some(TypeKind::Array { .. }))
    }

    /// If `ty` is a record whose last member is an array without a fixed
    /// length, return that member.
    pub fn trailing_flexible_array(&self, ty: TypeId) -> Option<&Field> {
        match self.get(ty)? {
            TypeKind::Record { fields, .. } => {
                let last = fields.last()?;
                match self.get(last.ty)? {
                    TypeKind::Array { len: None, .. } => Some(last),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
