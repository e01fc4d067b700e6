use super::*;

/// Minimal little-endian classic TIFF with ASCII/UNDEFINED entries.
fn build_tiff(entries: &[(u16, u16, &[u8])]) -> Vec<u8> {
    let mut out = b"II".to_vec();
    out.extend_from_slice(&42u16.to_le_bytes());
    out.extend_from_slice(&8u32.to_le_bytes());
    let ifd_len = 2 + entries.len() * 12 + 4;
    let mut payload_offset = 8 + ifd_len;
    let mut payloads = Vec::new();
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, field_type, data) in entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&field_type.to_le_bytes());
        let count = match field_type {
            3 => data.len() / 2,
            4 => data.len() / 4,
            _ => data.len(),
        };
        out.extend_from_slice(&(count as u32).to_le_bytes());
        if data.len() <= 4 {
            let mut inline = data.to_vec();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(payload_offset as u32).to_le_bytes());
            payloads.extend_from_slice(data);
            payload_offset += data.len();
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&payloads);
    out
}

#[test]
fn test_read_private_tags() {
    let ini = b"[User]\nUser=x\n[Beam]\nBeam=y\n";
    let bytes = build_tiff(&[
        (tags::IMAGE_WIDTH, 3, &1024u16.to_le_bytes()),
        (tags::MAKE, 2, b"FEI\0"),
        (tags::FEI_METADATA, 2, ini),
    ]);
    let dir = TiffDirectory::from_bytes(&bytes).unwrap();
    assert_eq!(dir.endian(), Endian::Little);
    assert!(!dir.is_big_tiff());
    assert_eq!(dir.unsigned(tags::IMAGE_WIDTH), Some(1024));
    assert_eq!(dir.ascii(tags::MAKE).as_deref(), Some("FEI"));
    assert_eq!(dir.bytes(tags::FEI_METADATA), Some(&ini[..]));
    assert!(!dir.has(tags::ZEISS_XML));
}

#[test]
fn test_big_endian_long() {
    let mut bytes = b"MM".to_vec();
    bytes.extend_from_slice(&42u16.to_be_bytes());
    bytes.extend_from_slice(&8u32.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&tags::IMAGE_LENGTH.to_be_bytes());
    bytes.extend_from_slice(&4u16.to_be_bytes());
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&768u32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    let dir = TiffDirectory::from_bytes(&bytes).unwrap();
    assert_eq!(dir.unsigned(tags::IMAGE_LENGTH), Some(768));
}

#[test]
fn test_bigtiff_header() {
    let mut bytes = b"II".to_vec();
    bytes.extend_from_slice(&43u16.to_le_bytes());
    bytes.extend_from_slice(&8u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&16u64.to_le_bytes());
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.extend_from_slice(&tags::ARTIST.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&6u64.to_le_bytes());
    bytes.extend_from_slice(b"alice\0\0\0");
    bytes.extend_from_slice(&0u64.to_le_bytes());
    let dir = TiffDirectory::from_bytes(&bytes).unwrap();
    assert!(dir.is_big_tiff());
    assert_eq!(dir.ascii(tags::ARTIST).as_deref(), Some("alice"));
}

#[test]
fn test_rejects_non_tiff() {
    assert!(matches!(
        TiffDirectory::from_bytes(b"GIF89a...."),
        Err(TiffError::BadByteOrder(_))
    ));
    assert!(matches!(
        TiffDirectory::from_bytes(b"II\x2b\x00"),
        Err(TiffError::Io(_))
    ));
    assert!(matches!(
        TiffDirectory::from_bytes(b"II\x07\x00\x08\x00\x00\x00"),
        Err(TiffError::BadVersion(7))
    ));
}

#[test]
fn test_offset_past_end() {
    let mut bytes = b"II".to_vec();
    bytes.extend_from_slice(&42u16.to_le_bytes());
    bytes.extend_from_slice(&4096u32.to_le_bytes());
    assert!(matches!(
        TiffDirectory::from_bytes(&bytes),
        Err(TiffError::OffsetOutOfBounds { offset: 4096, .. })
    ));
}

#[test]
fn test_payload_past_end_is_skipped() {
    let mut bytes = build_tiff(&[(tags::MAKE, 2, b"Zeiss Orion")]);
    bytes.truncate(bytes.len() - 4);
    let dir = TiffDirectory::from_bytes(&bytes).unwrap();
    assert!(dir.entries().is_empty());
}
