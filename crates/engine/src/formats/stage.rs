use tracing::warn;

use super::{malformed, FormatError, Reader};

const TEXT_FIELD_SIZE: usize = 128;
const OBJECT_HEADER_SIZE: usize = 28;
const QUAD_RECORD_SIZE: u16 = 0x1c;
const SCRIPT_PAYLOAD_SIZE: u16 = 0x0c;
const LIST_END: u16 = 0xffff;
const PLACEMENT_FLAG: u16 = 256;

/// One level's static scenery: geometry objects, their placements, and the
/// embedded camera/fog script, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub num: u32,
    pub name: String,
    /// Four (track title, track file path) pairs; unused slots are empty.
    pub bgms: [(String, String); 4],
    pub objects: Vec<SceneObject>,
    pub instances: Vec<ObjectPlacement>,
    pub script: Vec<ScriptEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub header: [u8; OBJECT_HEADER_SIZE],
    pub quads: Vec<Quad>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub script_index: u16,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub width: f32,
    pub height: f32,
}

/// References a `SceneObject` by position in the owning stage's object list.
/// The index is only meaningful within that one decoded stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectPlacement {
    pub object_index: usize,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptEvent {
    pub frame: u32,
    pub instruction: ScriptInstruction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptInstruction {
    ViewPosition {
        x: f32,
        y: f32,
        z: f32,
    },
    /// Fog color plus near/far planes. The color bytes are stored
    /// blue-first in the stream.
    Color {
        r: u8,
        g: u8,
        b: u8,
        a: u8,
        start: f32,
        end: f32,
    },
    ViewPosition2 {
        x: f32,
        y: f32,
        z: f32,
    },
    BeginInterpolateViewPosition2 {
        duration: u32,
    },
    BeginInterpolateFog {
        duration: u32,
    },
    /// Opcode this decoder does not understand yet; carried through
    /// unevaluated so newer streams keep loading.
    Unknown {
        kind: u16,
        payload: [u8; SCRIPT_PAYLOAD_SIZE as usize],
    },
}

impl Stage {
    pub fn read(data: &[u8], num: u32) -> Result<Stage, FormatError> {
        let mut reader = Reader::new(data);

        let object_count = reader.read_u16("object count")?;
        let _face_count = reader.read_u16("face count")?;
        let placement_offset = reader.read_u32("placement offset")? as usize;
        let script_offset = reader.read_u32("script offset")? as usize;
        let reserved_offset = reader.offset();
        let reserved = reader.read_u32("reserved header field")?;
        if reserved != 0 {
            return Err(malformed(
                reserved_offset,
                format!("unknown format variant, reserved field is {reserved:#x}"),
            ));
        }

        let name = reader.read_shift_jis(TEXT_FIELD_SIZE, "stage name")?;
        let mut titles: [String; 4] = Default::default();
        for slot in titles.iter_mut() {
            *slot = reader.read_shift_jis(TEXT_FIELD_SIZE, "track title")?;
        }
        let mut paths: [String; 4] = Default::default();
        for slot in paths.iter_mut() {
            *slot = reader.read_ascii(TEXT_FIELD_SIZE, "track path")?;
        }
        let [t0, t1, t2, t3] = titles;
        let [p0, p1, p2, p3] = paths;
        let bgms = [(t0, p0), (t1, p1), (t2, p2), (t3, p3)];

        let mut object_offsets = Vec::with_capacity(object_count as usize);
        for _ in 0..object_count {
            object_offsets.push(reader.read_u32("object offset")? as usize);
        }

        let mut objects = Vec::with_capacity(object_count as usize);
        for offset in object_offsets {
            reader.seek(offset);
            let mut header = [0u8; OBJECT_HEADER_SIZE];
            header.copy_from_slice(reader.read_bytes(OBJECT_HEADER_SIZE, "object header")?);
            let mut quads = Vec::new();
            loop {
                let marker = reader.read_u16("quad marker")?;
                let size_offset = reader.offset();
                let size = reader.read_u16("quad record size")?;
                if marker == LIST_END {
                    break;
                }
                if size != QUAD_RECORD_SIZE {
                    return Err(malformed(
                        size_offset,
                        format!("quad record size is {size}, expected {QUAD_RECORD_SIZE}"),
                    ));
                }
                let script_index = reader.read_u16("quad script index")?;
                let _pad = reader.read_u16("quad padding")?;
                quads.push(Quad {
                    script_index,
                    x: reader.read_f32("quad x")?,
                    y: reader.read_f32("quad y")?,
                    z: reader.read_f32("quad z")?,
                    width: reader.read_f32("quad width")?,
                    height: reader.read_f32("quad height")?,
                });
            }
            objects.push(SceneObject { header, quads });
        }

        reader.seek(placement_offset);
        let mut instances = Vec::new();
        loop {
            let record_offset = reader.offset();
            let object_id = reader.read_u16("placement object id")?;
            let flag = reader.read_u16("placement flag")?;
            if object_id == LIST_END && flag == LIST_END {
                break;
            }
            if flag != PLACEMENT_FLAG {
                return Err(malformed(
                    record_offset,
                    format!("placement flag is {flag}, expected {PLACEMENT_FLAG}"),
                ));
            }
            let x = reader.read_f32("placement x")?;
            let y = reader.read_f32("placement y")?;
            let z = reader.read_f32("placement z")?;
            let object_index = object_id as usize;
            if object_index >= objects.len() {
                return Err(malformed(
                    record_offset,
                    format!(
                        "placement references object {object_index} but only {} objects are defined",
                        objects.len()
                    ),
                ));
            }
            instances.push(ObjectPlacement {
                object_index,
                x,
                y,
                z,
            });
        }

        reader.seek(script_offset);
        let mut script = Vec::new();
        loop {
            let record_offset = reader.offset();
            let frame = reader.read_u32("script event frame")?;
            let kind = reader.read_u16("script event kind")?;
            let size = reader.read_u16("script event size")?;
            if frame == u32::MAX && kind == LIST_END && size == LIST_END {
                break;
            }
            if size != SCRIPT_PAYLOAD_SIZE {
                return Err(malformed(
                    record_offset,
                    format!("script event size is {size}, expected {SCRIPT_PAYLOAD_SIZE}"),
                ));
            }
            let mut payload = [0u8; SCRIPT_PAYLOAD_SIZE as usize];
            payload.copy_from_slice(reader.read_bytes(
                SCRIPT_PAYLOAD_SIZE as usize,
                "script event payload",
            )?);
            let instruction = decode_instruction(kind, payload, frame, record_offset);
            script.push(ScriptEvent { frame, instruction });
        }

        Ok(Stage {
            num,
            name,
            bgms,
            objects,
            instances,
            script,
        })
    }
}

fn decode_instruction(
    kind: u16,
    payload: [u8; SCRIPT_PAYLOAD_SIZE as usize],
    frame: u32,
    offset: usize,
) -> ScriptInstruction {
    match kind {
        0 => ScriptInstruction::ViewPosition {
            x: payload_f32(&payload, 0),
            y: payload_f32(&payload, 4),
            z: payload_f32(&payload, 8),
        },
        1 => ScriptInstruction::Color {
            b: payload[0],
            g: payload[1],
            r: payload[2],
            a: payload[3],
            start: payload_f32(&payload, 4),
            end: payload_f32(&payload, 8),
        },
        2 => ScriptInstruction::ViewPosition2 {
            x: payload_f32(&payload, 0),
            y: payload_f32(&payload, 4),
            z: payload_f32(&payload, 8),
        },
        3 => ScriptInstruction::BeginInterpolateViewPosition2 {
            duration: payload_u32(&payload, 0),
        },
        4 => ScriptInstruction::BeginInterpolateFog {
            duration: payload_u32(&payload, 0),
        },
        _ => {
            warn!(kind, frame, offset, "unknown_stage_script_opcode");
            ScriptInstruction::Unknown { kind, payload }
        }
    }
}

fn payload_f32(payload: &[u8; SCRIPT_PAYLOAD_SIZE as usize], at: usize) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&payload[at..at + 4]);
    f32::from_le_bytes(raw)
}

fn payload_u32(payload: &[u8; SCRIPT_PAYLOAD_SIZE as usize], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&payload[at..at + 4]);
    u32::from_le_bytes(raw)
}

/// Stage ordinal embedded in an asset name ("stage3.std" -> 3); 0 when the
/// name carries no digits.
pub(crate) fn number_from_name(name: &str) -> u32 {
    let digits: String = name.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

impl crate::resource::AssetFormat for Stage {
    fn decode(name: &str, data: &[u8]) -> Result<Self, FormatError> {
        Stage::read(data, number_from_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_SIZE: usize = 16;
    const TEXT_SECTION_SIZE: usize = TEXT_FIELD_SIZE * 9;

    fn push_u16(buf: &mut Vec<u8>, value: u16) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    fn push_u32(buf: &mut Vec<u8>, value: u32) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    fn push_f32(buf: &mut Vec<u8>, value: f32) {
        buf.extend_from_slice(&value.to_le_bytes());
    }

    fn push_text_field(buf: &mut Vec<u8>, text: &[u8]) {
        let mut field = [0u8; TEXT_FIELD_SIZE];
        field[..text.len()].copy_from_slice(text);
        buf.extend_from_slice(&field);
    }

    fn quad_record(script_index: u16, size: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        push_u16(&mut buf, 0);
        push_u16(&mut buf, size);
        push_u16(&mut buf, script_index);
        push_u16(&mut buf, 0);
        for value in [1.0f32, 2.0, 3.0, 16.0, 32.0] {
            push_f32(&mut buf, value);
        }
        buf
    }

    fn object_blob(quad_records: &[Vec<u8>], terminated: bool) -> Vec<u8> {
        let mut buf = vec![0u8; OBJECT_HEADER_SIZE];
        for record in quad_records {
            buf.extend_from_slice(record);
        }
        if terminated {
            push_u16(&mut buf, LIST_END);
            push_u16(&mut buf, 0);
        }
        buf
    }

    fn placement_record(object_id: u16, flag: u16, x: f32, y: f32, z: f32) -> Vec<u8> {
        let mut buf = Vec::new();
        push_u16(&mut buf, object_id);
        push_u16(&mut buf, flag);
        push_f32(&mut buf, x);
        push_f32(&mut buf, y);
        push_f32(&mut buf, z);
        buf
    }

    fn script_record(frame: u32, kind: u16, size: u16, payload: [u8; 12]) -> Vec<u8> {
        let mut buf = Vec::new();
        push_u32(&mut buf, frame);
        push_u16(&mut buf, kind);
        push_u16(&mut buf, size);
        buf.extend_from_slice(&payload);
        buf
    }

    fn view_position_payload(x: f32, y: f32, z: f32) -> [u8; 12] {
        let mut buf = Vec::new();
        push_f32(&mut buf, x);
        push_f32(&mut buf, y);
        push_f32(&mut buf, z);
        buf.try_into().expect("payload size")
    }

    fn duration_payload(duration: u32) -> [u8; 12] {
        let mut buf = Vec::new();
        push_u32(&mut buf, duration);
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 0);
        buf.try_into().expect("payload size")
    }

    /// Assembles a full stream: header, text fields, object offset table,
    /// object blobs, placement records, script records. Sentinels for the
    /// placement and script tables are appended here.
    fn build_stream(reserved: u32, objects: &[Vec<u8>], placements: &[Vec<u8>], script: &[Vec<u8>]) -> Vec<u8> {
        let table_size = objects.len() * 4;
        let objects_size: usize = objects.iter().map(Vec::len).sum();
        let objects_base = HEADER_SIZE + TEXT_SECTION_SIZE + table_size;
        let placement_offset = objects_base + objects_size;
        let placements_size: usize = placements.iter().map(Vec::len).sum();
        let script_offset = placement_offset + placements_size + 4;

        let mut buf = Vec::new();
        push_u16(&mut buf, objects.len() as u16);
        push_u16(&mut buf, 0);
        push_u32(&mut buf, placement_offset as u32);
        push_u32(&mut buf, script_offset as u32);
        push_u32(&mut buf, reserved);
        push_text_field(&mut buf, b"dream land");
        push_text_field(&mut buf, b"track a");
        for _ in 0..3 {
            push_text_field(&mut buf, b"");
        }
        push_text_field(&mut buf, b"bgm/track_a.mid");
        for _ in 0..3 {
            push_text_field(&mut buf, b"");
        }

        let mut cursor = objects_base;
        for object in objects {
            push_u32(&mut buf, cursor as u32);
            cursor += object.len();
        }
        for object in objects {
            buf.extend_from_slice(object);
        }
        for placement in placements {
            buf.extend_from_slice(placement);
        }
        push_u16(&mut buf, LIST_END);
        push_u16(&mut buf, LIST_END);
        for record in script {
            buf.extend_from_slice(record);
        }
        push_u32(&mut buf, u32::MAX);
        push_u16(&mut buf, LIST_END);
        push_u16(&mut buf, LIST_END);
        buf
    }

    #[test]
    fn empty_stage_decodes_from_immediate_sentinels() {
        let stream = build_stream(0, &[], &[], &[]);
        let stage = Stage::read(&stream, 1).expect("decode");
        assert_eq!(stage.num, 1);
        assert_eq!(stage.name, "dream land");
        assert_eq!(stage.bgms[0], ("track a".to_string(), "bgm/track_a.mid".to_string()));
        assert_eq!(stage.bgms[3], (String::new(), String::new()));
        assert!(stage.objects.is_empty());
        assert!(stage.instances.is_empty());
        assert!(stage.script.is_empty());
    }

    #[test]
    fn decodes_objects_placements_and_script() {
        let objects = vec![object_blob(&[quad_record(5, QUAD_RECORD_SIZE)], true)];
        let placements = vec![placement_record(0, PLACEMENT_FLAG, 7.0, 8.0, 9.0)];
        let script = vec![
            script_record(0, 0, SCRIPT_PAYLOAD_SIZE, view_position_payload(1.0, 2.0, 3.0)),
            script_record(10, 3, SCRIPT_PAYLOAD_SIZE, duration_payload(60)),
        ];
        let stream = build_stream(0, &objects, &placements, &script);

        let stage = Stage::read(&stream, 2).expect("decode");
        assert_eq!(stage.objects.len(), 1);
        assert_eq!(stage.objects[0].quads.len(), 1);
        assert_eq!(stage.objects[0].quads[0].script_index, 5);
        assert_eq!(stage.objects[0].quads[0].width, 16.0);
        assert_eq!(stage.instances.len(), 1);
        assert_eq!(stage.instances[0].object_index, 0);
        assert_eq!(stage.instances[0].z, 9.0);
        assert_eq!(stage.script.len(), 2);
        assert_eq!(
            stage.script[0].instruction,
            ScriptInstruction::ViewPosition { x: 1.0, y: 2.0, z: 3.0 }
        );
        assert_eq!(
            stage.script[1].instruction,
            ScriptInstruction::BeginInterpolateViewPosition2 { duration: 60 }
        );
    }

    #[test]
    fn decode_is_deterministic() {
        let objects = vec![object_blob(&[quad_record(1, QUAD_RECORD_SIZE)], true)];
        let placements = vec![placement_record(0, PLACEMENT_FLAG, 0.0, 0.0, 0.0)];
        let script = vec![script_record(4, 4, SCRIPT_PAYLOAD_SIZE, duration_payload(8))];
        let stream = build_stream(0, &objects, &placements, &script);

        let first = Stage::read(&stream, 6).expect("first decode");
        let second = Stage::read(&stream, 6).expect("second decode");
        assert_eq!(first, second);
    }

    #[test]
    fn nonzero_reserved_field_is_rejected() {
        let stream = build_stream(0xdead_beef, &[], &[], &[]);
        let error = Stage::read(&stream, 0).expect_err("reserved");
        match error {
            FormatError::Malformed { offset, message } => {
                assert_eq!(offset, 12);
                assert!(message.contains("unknown format variant"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn wrong_quad_record_size_is_rejected() {
        let objects = vec![object_blob(&[quad_record(0, 27)], true)];
        let stream = build_stream(0, &objects, &[], &[]);
        let error = Stage::read(&stream, 0).expect_err("quad size");
        assert!(matches!(error, FormatError::Malformed { .. }), "{error:?}");
    }

    #[test]
    fn unterminated_quad_list_is_an_eof_error() {
        let objects = vec![object_blob(&[quad_record(0, QUAD_RECORD_SIZE)], false)];
        // Placement/script tables land where the quad sentinel should be, so
        // the quad loop runs off the end of the stream.
        let mut stream = build_stream(0, &objects, &[], &[]);
        stream.truncate(HEADER_SIZE + TEXT_SECTION_SIZE + 4 + objects[0].len());
        let error = Stage::read(&stream, 0).expect_err("truncated");
        assert!(matches!(error, FormatError::UnexpectedEof { .. }), "{error:?}");
    }

    #[test]
    fn unexpected_placement_flag_is_rejected() {
        let objects = vec![object_blob(&[], true)];
        let placements = vec![placement_record(0, 5, 0.0, 0.0, 0.0)];
        let stream = build_stream(0, &objects, &placements, &[]);
        let error = Stage::read(&stream, 0).expect_err("flag");
        assert!(matches!(error, FormatError::Malformed { .. }), "{error:?}");
    }

    #[test]
    fn out_of_range_placement_is_rejected() {
        let objects = vec![object_blob(&[], true)];
        let placements = vec![placement_record(1, PLACEMENT_FLAG, 0.0, 0.0, 0.0)];
        let stream = build_stream(0, &objects, &placements, &[]);
        let error = Stage::read(&stream, 0).expect_err("bounds");
        match error {
            FormatError::Malformed { message, .. } => {
                assert!(message.contains("references object 1"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn wrong_script_record_size_is_rejected() {
        let script = vec![script_record(0, 0, 11, view_position_payload(0.0, 0.0, 0.0))];
        let stream = build_stream(0, &[], &[], &script);
        let error = Stage::read(&stream, 0).expect_err("script size");
        assert!(matches!(error, FormatError::Malformed { .. }), "{error:?}");
    }

    #[test]
    fn unknown_opcode_is_preserved_opaquely() {
        let payload = [9u8; 12];
        let script = vec![
            script_record(3, 99, SCRIPT_PAYLOAD_SIZE, payload),
            script_record(5, 0, SCRIPT_PAYLOAD_SIZE, view_position_payload(0.0, 1.0, 0.0)),
        ];
        let stream = build_stream(0, &[], &[], &script);
        let stage = Stage::read(&stream, 0).expect("decode");
        assert_eq!(stage.script.len(), 2);
        assert_eq!(
            stage.script[0].instruction,
            ScriptInstruction::Unknown { kind: 99, payload }
        );
        // Events keep stream order.
        assert_eq!(stage.script[0].frame, 3);
        assert_eq!(stage.script[1].frame, 5);
    }

    #[test]
    fn color_payload_is_stored_blue_first() {
        let payload = {
            let mut buf = vec![10u8, 20, 30, 40];
            push_f32(&mut buf, 100.0);
            push_f32(&mut buf, 400.0);
            <[u8; 12]>::try_from(buf).expect("payload size")
        };
        let script = vec![script_record(0, 1, SCRIPT_PAYLOAD_SIZE, payload)];
        let stream = build_stream(0, &[], &[], &script);
        let stage = Stage::read(&stream, 0).expect("decode");
        assert_eq!(
            stage.script[0].instruction,
            ScriptInstruction::Color {
                r: 30,
                g: 20,
                b: 10,
                a: 40,
                start: 100.0,
                end: 400.0,
            }
        );
    }

    #[test]
    fn stage_number_comes_from_name_digits() {
        assert_eq!(number_from_name("stage4.std"), 4);
        assert_eq!(number_from_name("demo.std"), 0);
    }
}
