//! RISC-V debug-section relocation fixup.
//!
//! Relocatable RISC-V objects reference `.debug_str` (and friends) through
//! `R_RISCV_32` entries that the DWARF loader does not apply on its own, so
//! every `DW_FORM_strp` in such a file would resolve to offset 0. Before
//! extraction we apply those relocations by hand to a scratch copy of the
//! file; the original is never touched.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::{env, fs, process};

use object::{elf, Architecture, Object, ObjectSection, ObjectSymbol, RelocationFlags, RelocationTarget};
use tracing::debug;

use crate::error::{Result, StructvizError};

/// A patched scratch copy of an object file.
///
/// The file lives in the system temp directory and is deleted when this guard
/// drops, so a failed extraction cannot leak scratch files across runs.
pub struct PatchedObject
{
    path: PathBuf,
}

impl PatchedObject
{
    pub fn path(&self) -> &Path
    {
        &self.path
    }
}

impl Drop for PatchedObject
{
    fn drop(&mut self)
    {
        let _ = fs::remove_file(&self.path);
    }
}

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

fn scratch_path() -> PathBuf
{
    let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    env::temp_dir().join(format!("structviz-reloc-{}-{seq}.o", process::id()))
}

/// Apply `R_RISCV_32` relocations against debug sections to a scratch copy
/// of the file at `path`.
///
/// Returns `Ok(None)` when there is nothing to do: the file is not RISC-V,
/// it has no symbol table, or no applicable relocation entries exist. Every
/// other relocation kind is skipped without comment. Running this over an
/// already-patched copy rewrites the same values, so the operation is
/// idempotent in effect.
pub fn create_patched_object(path: &Path) -> Result<Option<PatchedObject>>
{
    let mut data = fs::read(path)?;

    let patches = {
        let file = object::File::parse(&*data).map_err(|err| StructvizError::ObjectParse {
            path: path.to_path_buf(),
            detail: err.to_string(),
        })?;

        if !matches!(file.architecture(), Architecture::Riscv32 | Architecture::Riscv64) {
            return Ok(None);
        }
        if file.symbol_table().is_none() {
            return Ok(None);
        }

        collect_patches(&file, data.len())
    };

    if patches.is_empty() {
        return Ok(None);
    }

    let count = patches.len();
    for (offset, value) in patches {
        data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    let scratch = scratch_path();
    fs::write(&scratch, &data)?;
    debug!(
        "applied {} R_RISCV_32 debug relocations from {} into {}",
        count,
        path.display(),
        scratch.display()
    );
    Ok(Some(PatchedObject { path: scratch }))
}

/// Collect `(file offset, resolved value)` pairs for every applicable
/// relocation. Resolution is `(st_value + addend) mod 2^32`, stored
/// little-endian at `section file offset + relocation offset`.
fn collect_patches(file: &object::File<'_>, file_len: usize) -> Vec<(usize, u32)>
{
    let mut patches = Vec::new();

    for section in file.sections() {
        let Ok(name) = section.name() else {
            continue;
        };
        if !name.starts_with(".debug") {
            continue;
        }
        let Some((section_offset, _)) = section.file_range() else {
            continue;
        };

        for (offset, relocation) in section.relocations() {
            if relocation.flags() != (RelocationFlags::Elf { r_type: elf::R_RISCV_32 }) {
                continue;
            }
            let RelocationTarget::Symbol(index) = relocation.target() else {
                continue;
            };
            let Ok(symbol) = file.symbol_by_index(index) else {
                continue;
            };

            let value = symbol.address().wrapping_add(relocation.addend() as u64) as u32;
            let Ok(file_offset) = usize::try_from(section_offset + offset) else {
                continue;
            };
            if file_offset + 4 <= file_len {
                patches.push((file_offset, value));
            }
        }
    }

    patches
}
