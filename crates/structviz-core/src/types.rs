//! # Types
//!
//! Plain data records describing extracted struct layouts.
//!
//! These are produced once per input file by the extraction stage, are never
//! mutated afterwards, and are discarded once the diagrams that consume them
//! have been written.

/// Declaration coordinates for a struct, resolved through the DWARF line
/// program. Diagnostic only; rendering never looks at this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation
{
    pub file: String,
    pub line: u64,
}

/// One struct member as recorded in the debug info.
///
/// `name` is `"<anon>"` when the member carries no `DW_AT_name`; `type_name`
/// is `"?"` and `size` is `0` when the type-reference chain exhausts without
/// resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLayout
{
    pub name: String,
    pub type_name: String,
    /// Byte offset within the struct (0 if the location attribute is absent
    /// or non-constant).
    pub offset: u64,
    /// Byte size of the member's resolved type (0 if unresolved).
    pub size: u64,
    /// Whether the member carries bit-level size/offset attributes.
    pub is_bitfield: bool,
}

/// A struct's total byte size plus its members in declaration order.
///
/// Members stay in declaration order, not offset order; the rendering stage
/// derives byte occupancy on the fly and never needs them sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout
{
    pub size: u64,
    pub members: Vec<MemberLayout>,
    pub decl: Option<SourceLocation>,
}

impl StructLayout
{
    /// Classify every byte in `[0, size)` as belonging to one member (by
    /// index into `members`) or to padding (`None`).
    ///
    /// Bytes a member would claim beyond the struct's declared size are
    /// clipped. If two members claim the same byte the first claimant wins;
    /// well-formed compiler output never overlaps.
    pub fn occupancy(&self) -> Vec<Option<usize>>
    {
        let size = usize::try_from(self.size).unwrap_or(0);
        let mut bytes: Vec<Option<usize>> = vec![None; size];
        for (index, member) in self.members.iter().enumerate() {
            for b in 0..member.size {
                let Ok(byte) = usize::try_from(member.offset + b) else {
                    break;
                };
                if byte >= size {
                    break;
                }
                if bytes[byte].is_none() {
                    bytes[byte] = Some(index);
                }
            }
        }
        bytes
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn member(name: &str, offset: u64, size: u64) -> MemberLayout
    {
        MemberLayout {
            name: name.to_string(),
            type_name: "uint8_t".to_string(),
            offset,
            size,
            is_bitfield: false,
        }
    }

    #[test]
    fn occupancy_tiles_dense_struct_without_padding()
    {
        let layout = StructLayout {
            size: 4,
            members: vec![member("a", 0, 2), member("b", 2, 2)],
            decl: None,
        };
        assert_eq!(layout.occupancy(), vec![Some(0), Some(0), Some(1), Some(1)]);
    }

    #[test]
    fn occupancy_marks_unclaimed_bytes_as_padding()
    {
        let layout = StructLayout {
            size: 8,
            members: vec![member("a", 0, 1), member("b", 4, 4)],
            decl: None,
        };
        let bytes = layout.occupancy();
        assert_eq!(bytes[0], Some(0));
        assert_eq!(&bytes[1..4], &[None, None, None]);
        assert_eq!(&bytes[4..8], &[Some(1), Some(1), Some(1), Some(1)]);
    }

    #[test]
    fn occupancy_clips_members_past_struct_bounds()
    {
        let layout = StructLayout {
            size: 2,
            members: vec![member("a", 1, 4)],
            decl: None,
        };
        assert_eq!(layout.occupancy(), vec![None, Some(0)]);
    }

    #[test]
    fn occupancy_covers_every_byte_exactly_once()
    {
        let layout = StructLayout {
            size: 12,
            members: vec![member("a", 0, 1), member("b", 4, 4), member("c", 8, 2)],
            decl: None,
        };
        let bytes = layout.occupancy();
        assert_eq!(bytes.len(), 12);
        let claimed = bytes.iter().filter(|b| b.is_some()).count();
        let padding = bytes.iter().filter(|b| b.is_none()).count();
        assert_eq!(claimed + padding, 12);
        assert_eq!(claimed, 7);
        assert_eq!(padding, 5);
    }
}
