//! DWARF struct-layout extraction.
//!
//! Walks every compilation unit of a relocatable object file and produces a
//! [`StructLayout`] per structure type that declares a byte size. The walk is
//! read-only over gimli's DIE tree; nothing here owns DWARF data beyond the
//! section buffers loaded up front.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use gimli::{
    constants, AttributeValue, DebuggingInformationEntry, Dwarf, EndianArcSlice, Reader, RunTimeEndian, Unit, UnitOffset,
};
use object::{Object, ObjectSection};
use tracing::warn;

use crate::analyze;
use crate::error::{map_dwarf_error, Result, StructvizError};
use crate::reloc;
use crate::types::{MemberLayout, SourceLocation, StructLayout};

type OwnedReader = EndianArcSlice<RunTimeEndian>;

/// Placeholder for members without a `DW_AT_name`.
const ANON_MEMBER: &str = "<anon>";
/// Placeholder for type chains that exhaust without a name.
const UNKNOWN_TYPE: &str = "?";

/// Type-reference chains in well-formed compiler output are acyclic; the
/// bound only turns a pathological input into placeholder output instead of
/// unbounded recursion.
const MAX_TYPE_REF_DEPTH: usize = 32;

/// Extract every named struct layout from the object file at `path`.
///
/// RISC-V inputs are relocation-patched into a scratch copy first (see
/// [`reloc`]); the scratch file is deleted when this call returns, on the
/// error path included. A file without DWARF info yields a warning and an
/// empty map, not an error. Structs of the same name from later compilation
/// units overwrite earlier ones.
pub fn extract_structs(path: &Path) -> Result<BTreeMap<String, StructLayout>>
{
    let patched = reloc::create_patched_object(path)?;
    let actual = patched.as_ref().map_or(path, reloc::PatchedObject::path);
    extract_structs_at(actual)
}

fn extract_structs_at(path: &Path) -> Result<BTreeMap<String, StructLayout>>
{
    let bytes = fs::read(path)?;
    let data = Arc::<[u8]>::from(bytes);
    let file = object::File::parse(&*data).map_err(|err| StructvizError::ObjectParse {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })?;

    let has_debug_info = file
        .section_by_name(".debug_info")
        .is_some_and(|section| section.size() > 0);
    if !has_debug_info {
        warn!("{} has no DWARF info", path.display());
        return Ok(BTreeMap::new());
    }

    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };

    let dwarf = Dwarf::load(|id| Ok::<_, gimli::Error>(section_reader(&file, id, endian)))
        .map_err(|err| map_dwarf_error("loading DWARF sections", err))?;

    let structs = extract_from_dwarf(&dwarf)?;
    for (name, layout) in &structs {
        analyze::log_layout_report(name, layout);
    }
    Ok(structs)
}

fn section_reader(file: &object::File<'_>, id: gimli::SectionId, endian: RunTimeEndian) -> OwnedReader
{
    let data = file
        .section_by_name(id.name())
        .and_then(|section| section.uncompressed_data().ok())
        .map_or_else(
            || Arc::<[u8]>::from(Vec::new()),
            |data| match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
                Cow::Owned(vec) => vec.into(),
            },
        );
    EndianArcSlice::new(data, endian)
}

/// Extract struct layouts from already-loaded DWARF sections.
///
/// Three passes per compilation unit: a name/size table over every DIE, a
/// typedef-target table (to name anonymous structs declared as
/// `typedef struct { ... } name_t;`), then the structure types themselves.
pub fn extract_from_dwarf<R: Reader>(dwarf: &Dwarf<R>) -> Result<BTreeMap<String, StructLayout>>
{
    let mut structs = BTreeMap::new();

    let mut headers = dwarf.units();
    while let Some(header) = headers
        .next()
        .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
    {
        let unit = dwarf
            .unit(header)
            .map_err(|err| map_dwarf_error("parsing compilation unit", err))?;
        extract_unit(dwarf, &unit, &mut structs)?;
    }

    Ok(structs)
}

fn extract_unit<R: Reader>(
    dwarf: &Dwarf<R>,
    unit: &Unit<R>,
    structs: &mut BTreeMap<String, StructLayout>,
) -> Result<()>
{
    // First pass: collect names and byte sizes for every DIE so that member
    // type references resolve with a plain table lookup.
    let mut type_names: HashMap<UnitOffset<R::Offset>, String> = HashMap::new();
    let mut type_sizes: HashMap<UnitOffset<R::Offset>, u64> = HashMap::new();

    let mut entries = unit.entries();
    while let Some((_delta, entry)) = entries.next_dfs().map_err(|err| map_dwarf_error("traversing DIE tree", err))? {
        if let Some(name) = entry_name(dwarf, unit, entry)? {
            type_names.insert(entry.offset(), name);
        }
        if let Some(size) = entry_byte_size(entry)? {
            type_sizes.insert(entry.offset(), size);
        }
    }

    // Second pass: typedef targets. An anonymous struct referenced only
    // through a typedef takes the typedef's name.
    let mut typedef_names: HashMap<UnitOffset<R::Offset>, String> = HashMap::new();

    let mut entries = unit.entries();
    while let Some((_delta, entry)) = entries.next_dfs().map_err(|err| map_dwarf_error("traversing DIE tree", err))? {
        if entry.tag() != constants::DW_TAG_typedef {
            continue;
        }
        let Some(name) = entry_name(dwarf, unit, entry)? else {
            continue;
        };
        if let Some(AttributeValue::UnitRef(target)) = entry
            .attr_value(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
        {
            typedef_names.insert(target, name);
        }
    }

    // Third pass: the structure types themselves. Entries without a byte
    // size (opaque forward declarations) and entries that neither carry a
    // name nor appear as a typedef target are skipped.
    let mut entries = unit.entries();
    while let Some((_delta, entry)) = entries.next_dfs().map_err(|err| map_dwarf_error("traversing DIE tree", err))? {
        if entry.tag() != constants::DW_TAG_structure_type {
            continue;
        }
        let Some(size) = entry_byte_size(entry)? else {
            continue;
        };
        let name = match entry_name(dwarf, unit, entry)? {
            Some(name) => name,
            None => match typedef_names.get(&entry.offset()) {
                Some(name) => name.clone(),
                None => continue,
            },
        };

        let members = collect_members(dwarf, unit, entry.offset(), &type_names, &type_sizes)?;
        let decl = decl_location(dwarf, unit, entry);

        structs.insert(name, StructLayout { size, members, decl });
    }

    Ok(())
}

fn collect_members<R: Reader>(
    dwarf: &Dwarf<R>,
    unit: &Unit<R>,
    offset: UnitOffset<R::Offset>,
    type_names: &HashMap<UnitOffset<R::Offset>, String>,
    type_sizes: &HashMap<UnitOffset<R::Offset>, u64>,
) -> Result<Vec<MemberLayout>>
{
    let mut members = Vec::new();

    let mut tree = unit
        .entries_tree(Some(offset))
        .map_err(|err| map_dwarf_error("building struct tree", err))?;
    let root = tree.root().map_err(|err| map_dwarf_error("navigating struct root", err))?;
    let mut children = root.children();
    while let Some(child) = children
        .next()
        .map_err(|err| map_dwarf_error("iterating struct members", err))?
    {
        let entry = child.entry();
        if entry.tag() != constants::DW_TAG_member {
            continue;
        }

        let name = entry_name(dwarf, unit, entry)?.unwrap_or_else(|| ANON_MEMBER.to_string());

        let offset = entry
            .attr(constants::DW_AT_data_member_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_data_member_location", err))?
            .and_then(|attr| attr.udata_value())
            .unwrap_or(0);

        let is_bitfield = has_attr(entry, constants::DW_AT_bit_size)?
            || has_attr(entry, constants::DW_AT_bit_offset)?
            || has_attr(entry, constants::DW_AT_data_bit_offset)?;

        let (type_name, type_size) = match entry
            .attr_value(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
        {
            Some(AttributeValue::UnitRef(type_offset)) => (
                resolve_type_name(unit, type_offset, type_names, 0)?,
                resolve_type_size(unit, type_offset, type_sizes, 0)?,
            ),
            _ => (None, None),
        };

        members.push(MemberLayout {
            name,
            type_name: type_name.unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
            offset,
            size: type_size.unwrap_or(0),
            is_bitfield,
        });
    }

    Ok(members)
}

/// Follow the `DW_AT_type` reference chain until a named DIE is found.
///
/// Typedefs, const/volatile qualifiers, and pointers all interpose unnamed
/// (or differently named) DIEs between a member and the type whose name we
/// want; the first pass's table short-circuits the common case.
fn resolve_type_name<R: Reader>(
    unit: &Unit<R>,
    offset: UnitOffset<R::Offset>,
    type_names: &HashMap<UnitOffset<R::Offset>, String>,
    depth: usize,
) -> Result<Option<String>>
{
    if depth >= MAX_TYPE_REF_DEPTH {
        return Ok(None);
    }
    if let Some(name) = type_names.get(&offset) {
        return Ok(Some(name.clone()));
    }

    let die = unit
        .entry(offset)
        .map_err(|err| map_dwarf_error("resolving type reference", err))?;
    if let Some(AttributeValue::UnitRef(next)) = die
        .attr_value(constants::DW_AT_type)
        .map_err(|err| map_dwarf_error("reading nested type", err))?
    {
        return resolve_type_name(unit, next, type_names, depth + 1);
    }
    Ok(None)
}

/// Follow the `DW_AT_type` reference chain until a sized DIE is found.
fn resolve_type_size<R: Reader>(
    unit: &Unit<R>,
    offset: UnitOffset<R::Offset>,
    type_sizes: &HashMap<UnitOffset<R::Offset>, u64>,
    depth: usize,
) -> Result<Option<u64>>
{
    if depth >= MAX_TYPE_REF_DEPTH {
        return Ok(None);
    }
    if let Some(&size) = type_sizes.get(&offset) {
        return Ok(Some(size));
    }

    let die = unit
        .entry(offset)
        .map_err(|err| map_dwarf_error("resolving type reference", err))?;
    if let Some(AttributeValue::UnitRef(next)) = die
        .attr_value(constants::DW_AT_type)
        .map_err(|err| map_dwarf_error("reading nested type", err))?
    {
        return resolve_type_size(unit, next, type_sizes, depth + 1);
    }
    Ok(None)
}

fn entry_name<R: Reader>(
    dwarf: &Dwarf<R>,
    unit: &Unit<R>,
    entry: &DebuggingInformationEntry<'_, '_, R>,
) -> Result<Option<String>>
{
    let Some(attr) = entry
        .attr(constants::DW_AT_name)
        .map_err(|err| map_dwarf_error("reading DW_AT_name", err))?
    else {
        return Ok(None);
    };
    attr_to_string(dwarf, unit, attr.value()).map(Some)
}

fn attr_to_string<R: Reader>(dwarf: &Dwarf<R>, unit: &Unit<R>, value: AttributeValue<R>) -> Result<String>
{
    let reader = dwarf
        .attr_string(unit, value)
        .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
    let owned = match reader.to_string() {
        Ok(cow) => cow.into_owned(),
        Err(_) => reader
            .to_string_lossy()
            .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
            .into_owned(),
    };
    Ok(owned)
}

fn entry_byte_size<R: Reader>(entry: &DebuggingInformationEntry<'_, '_, R>) -> Result<Option<u64>>
{
    Ok(entry
        .attr(constants::DW_AT_byte_size)
        .map_err(|err| map_dwarf_error("reading DW_AT_byte_size", err))?
        .and_then(|attr| attr.udata_value()))
}

fn has_attr<R: Reader>(entry: &DebuggingInformationEntry<'_, '_, R>, name: constants::DwAt) -> Result<bool>
{
    Ok(entry
        .attr_value(name)
        .map_err(|err| map_dwarf_error("reading member attribute", err))?
        .is_some())
}

/// Resolve `DW_AT_decl_file`/`DW_AT_decl_line` through the unit's line
/// program. Best-effort: any missing piece yields `None`.
fn decl_location<R: Reader>(
    dwarf: &Dwarf<R>,
    unit: &Unit<R>,
    entry: &DebuggingInformationEntry<'_, '_, R>,
) -> Option<SourceLocation>
{
    let file_index = entry
        .attr(constants::DW_AT_decl_file)
        .ok()
        .flatten()
        .and_then(|attr| match attr.value() {
            AttributeValue::FileIndex(index) => Some(index),
            _ => attr.udata_value(),
        })?;

    let line = entry
        .attr(constants::DW_AT_decl_line)
        .ok()
        .flatten()
        .and_then(|attr| attr.udata_value())
        .unwrap_or(0);

    let file = file_name(dwarf, unit, file_index)?;
    Some(SourceLocation { file, line })
}

fn file_name<R: Reader>(dwarf: &Dwarf<R>, unit: &Unit<R>, index: u64) -> Option<String>
{
    let program = unit.line_program.as_ref()?;
    let header = program.header();
    let file = header.file(index)?;

    let directory = file
        .directory(header)
        .and_then(|attr| dwarf.attr_string(unit, attr).ok())
        .and_then(|reader| reader.to_string().ok().map(Cow::into_owned))
        .unwrap_or_default();
    let name = dwarf
        .attr_string(unit, file.path_name())
        .ok()?
        .to_string()
        .ok()?
        .into_owned();

    if directory.is_empty() {
        Some(name)
    } else {
        Some(format!("{directory}/{name}"))
    }
}
