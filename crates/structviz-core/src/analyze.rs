//! Alignment and padding analysis over extracted layouts.
//!
//! Pure functions; the same natural-alignment rule drives both the
//! field-access coloring in rendering and the per-struct diagnostics logged
//! after extraction.

use tracing::debug;

use crate::types::{MemberLayout, StructLayout};

/// Maximum natural alignment on the 32-bit targets this tool renders for.
pub const MAX_ALIGN: u64 = 4;

/// A member's natural alignment: its size capped at `max_align`, never 0.
pub fn natural_alignment(member: &MemberLayout, max_align: u64) -> u64
{
    member.size.min(max_align).max(1)
}

/// Whether accessing `member` needs byte-wise decomposition.
///
/// Bitfields and single-byte members are always naturally accessible;
/// anything else is misaligned when its offset is not a multiple of its
/// natural alignment.
pub fn is_misaligned(member: &MemberLayout, max_align: u64) -> bool
{
    if member.is_bitfield || member.size <= 1 {
        return false;
    }
    member.offset % natural_alignment(member, max_align) != 0
}

/// Bytes of the struct not claimed by any member.
pub fn padding_bytes(layout: &StructLayout) -> u64
{
    let occupied: u64 = layout.members.iter().map(|member| member.size).sum();
    layout.size.saturating_sub(occupied)
}

/// Alignment findings for one struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutReport
{
    /// Names of members whose offset breaks natural alignment.
    pub misaligned: Vec<String>,
    pub padding_bytes: u64,
}

pub fn report(layout: &StructLayout, max_align: u64) -> LayoutReport
{
    let misaligned = layout
        .members
        .iter()
        .filter(|member| is_misaligned(member, max_align))
        .map(|member| member.name.clone())
        .collect();

    LayoutReport {
        misaligned,
        padding_bytes: padding_bytes(layout),
    }
}

pub(crate) fn log_layout_report(name: &str, layout: &StructLayout)
{
    let report = report(layout, MAX_ALIGN);
    debug!(
        struct_name = name,
        size = layout.size,
        members = layout.members.len(),
        padding = report.padding_bytes,
        misaligned = ?report.misaligned,
        decl = ?layout.decl,
        "extracted struct layout"
    );
}
