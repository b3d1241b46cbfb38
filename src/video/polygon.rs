//! Polygon resource traversal and scanline filling.
//!
//! A polygon resource is a flat byte array of primitives addressed by
//! offset. A primitive whose header byte has the two top bits set is a
//! leaf polygon: bounding box, vertex count, then vertex pairs walking
//! down the left and right edges. A header of 2 opens a group: a
//! relative origin, a child count, and per child an offset (bit 15
//! carries an explicit color), a position and optionally that color.

use super::{DrawMode, Point, Video, VideoError};
use crate::definitions::{DEFAULT_ZOOM, SCREEN_HEIGHT, SCREEN_WIDTH};
use smallvec::SmallVec;

const MAX_VERTICES: usize = 50;
/// Groups in the shipped data nest a handful of levels at most; the
/// limit only exists to reject cyclic offsets in corrupt resources.
const MAX_GROUP_DEPTH: usize = 64;

/// Color byte whose bit 7 defers the choice to the leaf header.
const COLOR_FROM_LEAF: u8 = 0xFF;

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn at(data: &'a [u8], pos: usize) -> Result<Reader<'a>, VideoError> {
        if pos >= data.len() {
            return Err(VideoError::InvalidAddress(pos));
        }
        Ok(Reader { data, pos })
    }

    fn u8(&mut self) -> Result<u8, VideoError> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(VideoError::InvalidPolygonData)?;
        self.pos += 1;
        Ok(byte)
    }

    fn u16(&mut self) -> Result<u16, VideoError> {
        let hi = self.u8()? as u16;
        let lo = self.u8()? as u16;
        Ok(hi << 8 | lo)
    }
}

fn scaled(value: u8, zoom: u16) -> i32 {
    (value as u32 * zoom as u32 / DEFAULT_ZOOM as u32) as i32
}

/// Walk the primitive tree rooted at `address` and rasterize every leaf
/// into the video target buffer.
pub fn draw_tree(
    video: &mut Video,
    data: &[u8],
    address: usize,
    origin: Point,
    zoom: u16,
) -> Result<(), VideoError> {
    draw_primitive(video, data, address, COLOR_FROM_LEAF, origin, zoom, 0)
}

fn draw_primitive(
    video: &mut Video,
    data: &[u8],
    address: usize,
    color: u8,
    origin: Point,
    zoom: u16,
    depth: usize,
) -> Result<(), VideoError> {
    if depth > MAX_GROUP_DEPTH {
        return Err(VideoError::InvalidPolygonData);
    }
    let mut reader = Reader::at(data, address)?;

    let header = reader.u8()?;
    if header >= 0xC0 {
        let color = if color & 0x80 != 0 {
            header & 0x3F
        } else {
            color
        };
        let shape = read_shape(&mut reader, zoom)?;
        fill_shape(video, &shape, color, origin);
        return Ok(());
    }

    if header & 0x3F != 2 {
        return Err(VideoError::InvalidPolygonData);
    }

    let group_x = origin.x as i32 - scaled(reader.u8()?, zoom);
    let group_y = origin.y as i32 - scaled(reader.u8()?, zoom);
    let children = reader.u8()? as usize + 1;

    for _ in 0..children {
        let offset = reader.u16()?;
        let child = Point {
            x: (group_x + scaled(reader.u8()?, zoom)) as i16,
            y: (group_y + scaled(reader.u8()?, zoom)) as i16,
        };
        let mut child_color = COLOR_FROM_LEAF;
        if offset & 0x8000 != 0 {
            child_color = reader.u8()? & 0x7F;
            reader.u8()?; // padding byte after the inline color
        }
        let child_address = ((offset & 0x7FFF) as usize) * 2;
        draw_primitive(video, data, child_address, child_color, child, zoom, depth + 1)?;
    }
    Ok(())
}

struct Shape {
    bbw: u16,
    bbh: u16,
    vertices: SmallVec<[Point; 16]>,
}

fn read_shape(reader: &mut Reader, zoom: u16) -> Result<Shape, VideoError> {
    let bbw = scaled(reader.u8()?, zoom) as u16;
    let bbh = scaled(reader.u8()?, zoom) as u16;
    let count = reader.u8()? as usize;
    if count % 2 != 0 || count < 2 || count > MAX_VERTICES {
        return Err(VideoError::InvalidPolygonData);
    }

    let mut vertices = SmallVec::new();
    for _ in 0..count {
        let x = scaled(reader.u8()?, zoom) as i16;
        let y = scaled(reader.u8()?, zoom) as i16;
        vertices.push(Point { x, y });
    }
    Ok(Shape { bbw, bbh, vertices })
}

/// Horizontal step of an edge between two vertices, in 16.16 fixed
/// point, plus the number of scanlines the edge covers.
fn edge_step(from: Point, to: Point) -> (i64, i32) {
    let dy = (to.y - from.y) as i32;
    let delta = if dy <= 1 { 1 } else { dy };
    let step = (((to.x as i32 - from.x as i32) * (0x4000 / delta)) << 2) as i64;
    (step, dy.max(0))
}

fn fill_shape(video: &mut Video, shape: &Shape, color: u8, origin: Point) {
    let mode = DrawMode::from_color(color);
    let count = shape.vertices.len();

    if shape.bbw == 0 && shape.bbh == 1 && count == 4 {
        video.draw_dot(origin.x, origin.y, mode);
        return;
    }

    let left = origin.x as i32 - shape.bbw as i32 / 2;
    let right = origin.x as i32 + shape.bbw as i32 / 2;
    let top = origin.y as i32 - shape.bbh as i32 / 2;
    let bottom = origin.y as i32 + shape.bbh as i32 / 2;
    if left > SCREEN_WIDTH as i32 - 1 || right < 0 || top > SCREEN_HEIGHT as i32 - 1 || bottom < 0 {
        return;
    }

    let mut scanline = top;
    let mut i = 0usize;
    let mut j = count - 1;

    // The first and last vertex seed the two edge walkers; vertices are
    // stored clockwise from the top-right corner.
    let mut right_x = ((shape.vertices[i].x as i32 + left) as i64) << 16;
    let mut left_x = ((shape.vertices[j].x as i32 + left) as i64) << 16;
    i += 1;
    j -= 1;

    let mut remaining = count as i32;
    loop {
        remaining -= 2;
        if remaining == 0 {
            break;
        }
        let (left_step, _) = edge_step(shape.vertices[j + 1], shape.vertices[j]);
        let (right_step, height) = edge_step(shape.vertices[i - 1], shape.vertices[i]);
        i += 1;
        j -= 1;

        // Edge rounding bias: the left walker rounds up, the right
        // walker rounds down.
        left_x = (left_x & !0xFFFF) | 0x7FFF;
        right_x = (right_x & !0xFFFF) | 0x8000;

        if height == 0 {
            left_x += left_step;
            right_x += right_step;
            continue;
        }

        for _ in 0..height {
            if scanline >= 0 {
                let x1 = (left_x >> 16) as i32;
                let x2 = (right_x >> 16) as i32;
                if x1 <= SCREEN_WIDTH as i32 - 1 && x2 >= 0 {
                    video.draw_span(scanline, x1, x2, mode);
                }
            }
            left_x += left_step;
            right_x += right_step;
            scanline += 1;
            if scanline > SCREEN_HEIGHT as i32 - 1 {
                return;
            }
        }
    }
}
