//! Relocation fixup tests over synthetic RISC-V objects.

use std::path::PathBuf;
use std::{env, fs, process};

use object::write::{Object, Relocation, Symbol};
use object::{
    elf, Architecture, BinaryFormat, Endianness, Object as _, ObjectSection, RelocationFlags, SectionKind, SymbolFlags,
    SymbolKind, SymbolScope,
};
use structviz_core::reloc::create_patched_object;

fn scratch_input(name: &str, bytes: &[u8]) -> PathBuf
{
    let path = env::temp_dir().join(format!("structviz-test-{}-{name}.o", process::id()));
    fs::write(&path, bytes).expect("write fixture object");
    path
}

/// A RISC-V relocatable object with 16 zero bytes of `.debug_info`, one
/// `R_RISCV_32` entry at offset 4 and one `R_RISCV_HI20` entry at offset 12.
fn riscv_object() -> Vec<u8>
{
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Riscv32, Endianness::Little);
    let section = obj.add_section(Vec::new(), b".debug_info".to_vec(), SectionKind::Debug);
    obj.append_section_data(section, &[0u8; 16], 1);

    let symbol = obj.add_symbol(Symbol {
        name: b".Ldebug_str0".to_vec(),
        value: 0x1234,
        size: 0,
        kind: SymbolKind::Data,
        scope: SymbolScope::Compilation,
        weak: false,
        section: object::write::SymbolSection::Absolute,
        flags: SymbolFlags::None,
    });

    obj.add_relocation(
        section,
        Relocation {
            offset: 4,
            symbol,
            addend: 0x10,
            flags: RelocationFlags::Elf { r_type: elf::R_RISCV_32 },
        },
    )
    .expect("add R_RISCV_32");
    obj.add_relocation(
        section,
        Relocation {
            offset: 12,
            symbol,
            addend: 0,
            flags: RelocationFlags::Elf { r_type: elf::R_RISCV_HI20 },
        },
    )
    .expect("add R_RISCV_HI20");

    obj.write().expect("write fixture object")
}

/// File offset of `.debug_info` in the given object bytes.
fn debug_info_offset(bytes: &[u8]) -> usize
{
    let file = object::File::parse(bytes).expect("parse fixture");
    let section = file.section_by_name(".debug_info").expect("find .debug_info");
    let (offset, _) = section.file_range().expect("file range");
    usize::try_from(offset).expect("offset fits")
}

#[test]
fn riscv_32_relocations_are_patched_into_a_scratch_copy()
{
    let input = scratch_input("patch", &riscv_object());

    let patched = create_patched_object(&input)
        .expect("fixup succeeds")
        .expect("riscv object needs patching");
    let bytes = fs::read(patched.path()).expect("read scratch copy");

    let base = debug_info_offset(&bytes);
    // (st_value 0x1234 + addend 0x10) little-endian at relocation offset 4.
    assert_eq!(&bytes[base + 4..base + 8], &0x1244u32.to_le_bytes());
    // The R_RISCV_HI20 entry is skipped, its bytes stay zero.
    assert_eq!(&bytes[base + 12..base + 16], &[0u8; 4]);
    // The input itself is untouched.
    let original = fs::read(&input).expect("read input");
    assert_eq!(&original[base + 4..base + 8], &[0u8; 4]);

    fs::remove_file(&input).ok();
}

#[test]
fn fixup_is_idempotent_in_effect()
{
    let input = scratch_input("idempotent", &riscv_object());

    let first = create_patched_object(&input)
        .expect("first fixup succeeds")
        .expect("riscv object needs patching");
    let first_bytes = fs::read(first.path()).expect("read first scratch copy");

    let second = create_patched_object(first.path())
        .expect("second fixup succeeds")
        .expect("relocation entries are still present");
    let second_bytes = fs::read(second.path()).expect("read second scratch copy");

    assert_eq!(first_bytes, second_bytes);

    fs::remove_file(&input).ok();
}

#[test]
fn non_riscv_objects_are_left_alone()
{
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let section = obj.add_section(Vec::new(), b".debug_info".to_vec(), SectionKind::Debug);
    obj.append_section_data(section, &[0u8; 16], 1);
    let input = scratch_input("x86", &obj.write().expect("write fixture object"));

    assert!(create_patched_object(&input).expect("fixup succeeds").is_none());

    fs::remove_file(&input).ok();
}

#[test]
fn riscv_object_without_relocations_needs_no_patching()
{
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::Riscv32, Endianness::Little);
    let section = obj.add_section(Vec::new(), b".debug_info".to_vec(), SectionKind::Debug);
    obj.append_section_data(section, &[0u8; 16], 1);
    // A symbol table but nothing referencing it.
    obj.add_symbol(Symbol {
        name: b"lonely".to_vec(),
        value: 0,
        size: 0,
        kind: SymbolKind::Data,
        scope: SymbolScope::Compilation,
        weak: false,
        section: object::write::SymbolSection::Absolute,
        flags: SymbolFlags::None,
    });
    let input = scratch_input("noreloc", &obj.write().expect("write fixture object"));

    assert!(create_patched_object(&input).expect("fixup succeeds").is_none());

    fs::remove_file(&input).ok();
}

#[test]
fn scratch_copy_is_deleted_when_the_guard_drops()
{
    let input = scratch_input("guard", &riscv_object());

    let patched = create_patched_object(&input)
        .expect("fixup succeeds")
        .expect("riscv object needs patching");
    let scratch = patched.path().to_path_buf();
    assert!(scratch.exists());

    drop(patched);
    assert!(!scratch.exists());

    fs::remove_file(&input).ok();
}
