//! SVG diagram generation.
//!
//! Three fixed diagram generators over extracted layouts, sharing one row
//! renderer. Geometry and palette are deliberately constant: these diagrams
//! are figures for written material, not a general visualization surface.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::analyze::{self, MAX_ALIGN};
use crate::error::Result;
use crate::types::{MemberLayout, StructLayout};

/// Pixels per byte cell.
const SCALE: u64 = 32;
/// Height of one struct row.
const ROW_H: u64 = 40;
/// Width of the left label column.
const LABEL_W: u64 = 180;
/// Outer margin around the diagram.
const PAD: u64 = 20;

const FIELD_COLOR: &str = "#4a90d9";
const PADDING_FILL: &str = "#e74c3c";
const PADDING_STROKE: &str = "#c0392b";
const NATIVE_COLOR: &str = "#27ae60";
const DECOMPOSED_COLOR: &str = "#e67e22";
const MISALIGNED_NEW_COLOR: &str = "#e74c3c";

/// The field highlighted as newly introduced in the evolution diagram.
const EVOLVED_FIELD: &str = "error_code";

/// Color-selection strategy for one rendered row.
type ColorFn<'a> = &'a dyn Fn(&MemberLayout) -> &'static str;

fn svg_header(width: u64, height: u64) -> String
{
    format!(
        concat!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" ",
            "font-family=\"monospace\" font-size=\"12\">\n",
            "<style>\n",
            "  .field {{ stroke: #333; stroke-width: 1; }}\n",
            "  .pad {{ fill: {pad_fill}; opacity: 0.3; stroke: {pad_stroke}; stroke-width: 1; stroke-dasharray: 4,2; }}\n",
            "  .label {{ text-anchor: end; dominant-baseline: middle; fill: #333; }}\n",
            "  .offset {{ text-anchor: middle; dominant-baseline: hanging; fill: #666; font-size: 10; }}\n",
            "  .caption {{ font-size: 14; font-weight: bold; fill: #333; }}\n",
            "</style>\n",
        ),
        width = width,
        height = height,
        pad_fill = PADDING_FILL,
        pad_stroke = PADDING_STROKE,
    )
}

const SVG_FOOTER: &str = "</svg>\n";

/// Native vs. byte-decomposed access color for one member.
pub fn access_color(member: &MemberLayout) -> &'static str
{
    // Single-byte members are byte accesses either way.
    if member.size <= 1 {
        return NATIVE_COLOR;
    }
    if analyze::is_misaligned(member, MAX_ALIGN) {
        DECOMPOSED_COLOR
    } else {
        NATIVE_COLOR
    }
}

/// Draw one struct as a row of byte-wide cells at vertical position `y`.
///
/// Emits one rectangle per member (even zero-sized ones, which collapse to
/// invisible), one single-byte hatched rectangle per unclaimed byte, an
/// offset tick under each member's left edge, and a trailing tick at the
/// struct's total size.
fn render_struct_row(svg: &mut String, layout: &StructLayout, y: u64, label: &str, color: Option<ColorFn<'_>>)
{
    if !label.is_empty() {
        let _ = writeln!(
            svg,
            r#"<text x="{x}" y="{cy}" class="label">{label}</text>"#,
            x = LABEL_W - 10,
            cy = y + ROW_H / 2,
        );
    }

    for member in &layout.members {
        let x = LABEL_W + member.offset * SCALE;
        let w = member.size * SCALE;
        let fill = color.map_or(FIELD_COLOR, |choose| choose(member));
        let _ = writeln!(
            svg,
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}" class="field" />"#,
            h = ROW_H,
        );
        let _ = writeln!(
            svg,
            concat!(
                r#"<text x="{tx}" y="{ty}" text-anchor="middle" dominant-baseline="middle" "#,
                r#"fill="white" font-size="10">{name}</text>"#,
            ),
            tx = x + w / 2,
            ty = y + ROW_H / 2,
            name = member.name,
        );
    }

    for (byte, occupant) in layout.occupancy().iter().enumerate() {
        if occupant.is_none() {
            let x = LABEL_W + byte as u64 * SCALE;
            let _ = writeln!(
                svg,
                r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" class="pad" />"#,
                w = SCALE,
                h = ROW_H,
            );
        }
    }

    for member in &layout.members {
        let x = LABEL_W + member.offset * SCALE;
        let _ = writeln!(
            svg,
            r#"<text x="{x}" y="{ty}" class="offset">{offset}</text>"#,
            ty = y + ROW_H + 3,
            offset = member.offset,
        );
    }
    let _ = writeln!(
        svg,
        r#"<text x="{x}" y="{ty}" class="offset">{size}</text>"#,
        x = LABEL_W + layout.size * SCALE,
        ty = y + ROW_H + 3,
        size = layout.size,
    );
}

fn padding_waste_document(unpacked: &StructLayout, pack1: &StructLayout) -> String
{
    let max_bytes = unpacked.size.max(pack1.size);
    let width = LABEL_W + max_bytes * SCALE + PAD * 2;
    let height = PAD + (ROW_H + 30) * 2 + 40;

    let mut svg = svg_header(width, height);
    let _ = writeln!(
        svg,
        r#"<text x="{PAD}" y="{PAD}" class="caption">Struct Layout: Unpacked vs Packed</text>"#,
    );

    let y1 = PAD + 25;
    render_struct_row(&mut svg, unpacked, y1, &format!("unpacked ({}B)", unpacked.size), None);

    let y2 = y1 + ROW_H + 30;
    render_struct_row(&mut svg, pack1, y2, &format!("pack(1) ({}B)", pack1.size), None);

    svg.push_str(SVG_FOOTER);
    svg
}

fn field_access_document(pa4: &StructLayout) -> String
{
    let width = LABEL_W + pa4.size * SCALE + PAD * 2;
    // Extra space below the row for the legend.
    let height = PAD + ROW_H + 30 + 60;

    let mut svg = svg_header(width, height);
    let _ = writeln!(
        svg,
        r#"<text x="{PAD}" y="{PAD}" class="caption">Field Access: packed, aligned(4)</text>"#,
    );

    let y = PAD + 25;
    render_struct_row(
        &mut svg,
        pa4,
        y,
        &format!("pa4 ({}B)", pa4.size),
        Some(&access_color),
    );

    let legend_y = y + ROW_H + 25;
    let _ = writeln!(
        svg,
        r#"<rect x="{x}" y="{legend_y}" width="14" height="14" fill="{NATIVE_COLOR}" />"#,
        x = LABEL_W,
    );
    let _ = writeln!(
        svg,
        r##"<text x="{x}" y="{ty}" font-size="11" fill="#333">native access</text>"##,
        x = LABEL_W + 20,
        ty = legend_y + 10,
    );
    let _ = writeln!(
        svg,
        r#"<rect x="{x}" y="{legend_y}" width="14" height="14" fill="{DECOMPOSED_COLOR}" />"#,
        x = LABEL_W + 140,
    );
    let _ = writeln!(
        svg,
        r##"<text x="{x}" y="{ty}" font-size="11" fill="#333">byte-decomposed</text>"##,
        x = LABEL_W + 160,
        ty = legend_y + 10,
    );

    svg.push_str(SVG_FOOTER);
    svg
}

fn evolution_document(before: &StructLayout, after: &StructLayout) -> String
{
    let max_bytes = before.size.max(after.size);
    let width = LABEL_W + max_bytes * SCALE + PAD * 2;
    let height = PAD + (ROW_H + 30) * 2 + 40;

    let after_color = |member: &MemberLayout| -> &'static str {
        if member.name == EVOLVED_FIELD {
            MISALIGNED_NEW_COLOR
        } else {
            access_color(member)
        }
    };

    let mut svg = svg_header(width, height);
    let _ = writeln!(
        svg,
        r#"<text x="{PAD}" y="{PAD}" class="caption">Struct Evolution: Adding {EVOLVED_FIELD}</text>"#,
    );

    let y1 = PAD + 25;
    render_struct_row(
        &mut svg,
        before,
        y1,
        &format!("before ({}B)", before.size),
        Some(&access_color),
    );

    let y2 = y1 + ROW_H + 30;
    render_struct_row(&mut svg, after, y2, &format!("after ({}B)", after.size), Some(&after_color));

    svg.push_str(SVG_FOOTER);
    svg
}

fn write_svg(svg: &str, out_path: &Path) -> Result<()>
{
    fs::write(out_path, svg)?;
    println!("  wrote {}", out_path.display());
    Ok(())
}

/// Unpacked vs. tightly packed layouts of the same struct, padding hatched.
pub fn generate_padding_waste_svg(unpacked: &StructLayout, pack1: &StructLayout, out_path: &Path) -> Result<()>
{
    write_svg(&padding_waste_document(unpacked, pack1), out_path)
}

/// One packed-and-aligned layout, fields colored native vs. byte-decomposed.
pub fn generate_field_access_svg(pa4: &StructLayout, out_path: &Path) -> Result<()>
{
    write_svg(&field_access_document(pa4), out_path)
}

/// Before/after layouts of the same struct family, with the newly introduced
/// misaligned field highlighted in the "after" row.
pub fn generate_evolution_svg(before: &StructLayout, after: &StructLayout, out_path: &Path) -> Result<()>
{
    write_svg(&evolution_document(before, after), out_path)
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

    fn count(haystack: &str, needle: &str) -> usize
    {
        haystack.matches(needle).count()
    }

    #[test]
    fn row_emits_one_rect_per_member_plus_one_per_padding_byte()
    {
        let layout = StructLayout {
            size: 12,
            members: vec![member("a", 0, 1), member("b", 4, 4), member("c", 8, 2)],
            decl: None,
        };
        let mut svg = String::new();
        render_struct_row(&mut svg, &layout, 0, "", None);

        assert_eq!(count(&svg, r#"class="field""#), 3);
        // 12 bytes total, 7 claimed.
        assert_eq!(count(&svg, r#"class="pad""#), 5);
    }

    #[test]
    fn dense_struct_renders_zero_padding_cells()
    {
        let layout = StructLayout {
            size: 8,
            members: vec![member("a", 0, 4), member("b", 4, 2), member("c", 6, 2)],
            decl: None,
        };
        let mut svg = String::new();
        render_struct_row(&mut svg, &layout, 0, "", None);

        assert_eq!(count(&svg, r#"class="pad""#), 0);
    }

    #[test]
    fn row_emits_offset_ticks_plus_trailing_size_tick()
    {
        let layout = StructLayout {
            size: 6,
            members: vec![member("a", 0, 2), member("b", 2, 4)],
            decl: None,
        };
        let mut svg = String::new();
        render_struct_row(&mut svg, &layout, 0, "", None);

        assert_eq!(count(&svg, r#"class="offset""#), 3);
        assert!(svg.contains(r#"class="offset">6</text>"#));
    }

    #[test]
    fn access_color_follows_natural_alignment()
    {
        assert_eq!(access_color(&member("byte", 3, 1)), NATIVE_COLOR);
        assert_eq!(access_color(&member("word", 0, 4)), NATIVE_COLOR);
        assert_eq!(access_color(&member("split", 2, 4)), DECOMPOSED_COLOR);
    }

    #[test]
    fn padding_waste_width_follows_the_wider_struct()
    {
        let narrow = StructLayout {
            size: 4,
            members: vec![member("a", 0, 4)],
            decl: None,
        };
        let wide = StructLayout {
            size: 8,
            members: vec![member("a", 0, 4), member("b", 4, 4)],
            decl: None,
        };
        let svg = padding_waste_document(&wide, &narrow);
        let expected = LABEL_W + 8 * SCALE + PAD * 2;
        assert!(svg.contains(&format!(r#"width="{expected}""#)));
    }

    #[test]
    fn field_access_document_includes_legend()
    {
        let layout = StructLayout {
            size: 4,
            members: vec![member("a", 0, 4)],
            decl: None,
        };
        let svg = field_access_document(&layout);
        assert!(svg.contains("native access"));
        assert!(svg.contains("byte-decomposed"));
    }

    #[test]
    fn evolution_document_highlights_the_new_field()
    {
        let before = StructLayout {
            size: 4,
            members: vec![member("a", 0, 4)],
            decl: None,
        };
        let after = StructLayout {
            size: 8,
            members: vec![member("a", 0, 4), member("error_code", 4, 4)],
            decl: None,
        };
        let svg = evolution_document(&before, &after);
        assert!(svg.contains(&format!(r#"fill="{MISALIGNED_NEW_COLOR}""#)));
        // The aligned original field keeps its access color in both rows.
        assert_eq!(count(&svg, &format!(r#"fill="{NATIVE_COLOR}""#)), 2);
    }
}
