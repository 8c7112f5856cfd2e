//! Helpers for building test documents in memory.

use std::io::{Cursor, Write as _};

use image::{ImageFormat, Rgb, RgbImage};
use zip::{ZipWriter, write::SimpleFileOptions};

fn encode(format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_pixel(4, 4, Rgb([200, 30, 30]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).expect("failed to encode test image");
    out.into_inner()
}

/// A tiny PNG.
pub fn png_bytes() -> Vec<u8> {
    encode(ImageFormat::Png)
}

/// A tiny JPEG.
pub fn jpeg_bytes() -> Vec<u8> {
    encode(ImageFormat::Jpeg)
}

/// A tiny JPEG with an EXIF block holding `DateTime` and, optionally,
/// `DateTimeOriginal`. Dates use the EXIF `YYYY:MM:DD HH:MM:SS` form.
pub fn jpeg_with_exif(date_time: &str, date_time_original: Option<&str>) -> Vec<u8> {
    fn ascii(text: &str) -> Vec<u8> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        bytes
    }
    fn ifd_entry(out: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: u32) {
        out.extend(tag.to_le_bytes());
        out.extend(kind.to_le_bytes());
        out.extend(count.to_le_bytes());
        out.extend(value.to_le_bytes());
    }
    const ASCII: u16 = 2;
    const LONG: u16 = 4;

    // Little-endian TIFF: IFD0 holds `DateTime` and a pointer to the Exif
    // IFD, which holds `DateTimeOriginal`. String values follow each IFD.
    let date_time = ascii(date_time);
    let ifd0_len = if date_time_original.is_some() { 2 } else { 1 };
    let ifd0_end = 8 + 2 + 12 * ifd0_len + 4;
    let exif_ifd = ifd0_end + date_time.len();

    let mut tiff = b"II*\0".to_vec();
    tiff.extend(8u32.to_le_bytes());
    tiff.extend((ifd0_len as u16).to_le_bytes());
    ifd_entry(&mut tiff, 0x0132, ASCII, date_time.len() as u32, ifd0_end as u32);
    if date_time_original.is_some() {
        ifd_entry(&mut tiff, 0x8769, LONG, 1, exif_ifd as u32);
    }
    tiff.extend(0u32.to_le_bytes());
    tiff.extend(&date_time);
    if let Some(original) = date_time_original {
        let original = ascii(original);
        tiff.extend(1u16.to_le_bytes());
        ifd_entry(&mut tiff, 0x9003, ASCII, original.len() as u32, (exif_ifd + 18) as u32);
        tiff.extend(0u32.to_le_bytes());
        tiff.extend(&original);
    }

    // Splice an APP1 segment in right after the SOI marker.
    let jpeg = jpeg_bytes();
    let mut out = jpeg[..2].to_vec();
    out.extend([0xFF, 0xE1]);
    out.extend(((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend(b"Exif\0\0");
    out.extend(&tiff);
    out.extend(&jpeg[2..]);
    out
}

/// A valid PDF with `page_count` blank pages and a `/CreationDate` of
/// 2024-03-15.
pub fn minimal_pdf(page_count: usize) -> Vec<u8> {
    let first_page = 4;
    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", first_page + i))
        .collect::<Vec<_>>()
        .join(" ");
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_owned(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"),
        "<< /Producer (doc-intake tests) /CreationDate (D:20240315120000Z) >>".to_owned(),
    ];
    for _ in 0..page_count {
        objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 72 72] >>".to_owned());
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        write!(pdf, "{} 0 obj\n{object}\nendobj\n", i + 1).expect("write to Vec");
    }
    let xref_offset = pdf.len();
    write!(pdf, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).expect("write to Vec");
    for offset in offsets {
        write!(pdf, "{offset:010} 00000 n \n").expect("write to Vec");
    }
    write!(
        pdf,
        "trailer\n<< /Size {} /Root 1 0 R /Info 3 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    )
    .expect("write to Vec");
    pdf
}

/// Build a ZIP archive from `(name, contents)` pairs.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("failed to start ZIP entry");
        zip.write_all(contents).expect("failed to write ZIP entry");
    }
    zip.finish().expect("failed to finish ZIP").into_inner()
}
