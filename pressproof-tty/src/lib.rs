//! Terminal frontend: composes view units into RGBA frames, pushes them to
//! the terminal over the kitty graphics protocol, and maps crossterm input
//! to viewer commands.

use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind},
    terminal::{Clear, ClearType},
};
use image::imageops::FilterType;
use image::RgbaImage;
use png::{BitDepth, ColorType, Encoder};
use tracing::warn;

use pressproof_core::{
    Command, FlipDirection, PageCache, PageSlot, SelectionRect, Vec2, ViewUnit, ViewportTransform,
};

const BACKGROUND: [u8; 4] = [24, 24, 28, 255];
const SLOT_LOADING: [u8; 4] = [90, 90, 96, 255];
const SLOT_FAILED: [u8; 4] = [64, 40, 40, 255];
const SLOT_FAILED_MARK: [u8; 3] = [210, 120, 120];
const SLOT_ABSENT: [u8; 4] = [40, 40, 46, 255];
const PLACEHOLDER_BORDER: [u8; 3] = [230, 180, 60];
const SELECTION_FILL: [u8; 3] = [120, 170, 255];
const FLIP_SHADE: [u8; 3] = [0, 0, 0];

/// An RGBA8 frame sized to the drawable area of the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width * height) {
            pixels.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }
}

/// Renders a view unit into a frame: one full-width slot in single mode, two
/// half-width slots in book mode. Every slot state has a distinct look so a
/// blank cover side never reads as a failed fetch.
pub fn compose_unit_frame(unit: &ViewUnit, cache: &PageCache, width: u32, height: u32) -> Frame {
    let mut frame = Frame::filled(width, height, BACKGROUND);
    let (frame_width, frame_height) = (frame.width, frame.height);
    match unit {
        ViewUnit::Empty => {}
        ViewUnit::Single(page) => {
            let slot = cache.slot(*page);
            draw_slot(&mut frame, &slot, 0, 0, frame_width, frame_height);
        }
        ViewUnit::Spread { spread, .. } => {
            let half = (frame_width / 2).max(1);
            let left = spread
                .left
                .map(|page| cache.slot(page))
                .unwrap_or(PageSlot::Absent);
            let right = spread
                .right
                .map(|page| cache.slot(page))
                .unwrap_or(PageSlot::Absent);
            draw_slot(&mut frame, &left, 0, 0, half, frame_height);
            draw_slot(&mut frame, &right, half, 0, frame_width - half, frame_height);
        }
    }
    frame
}

fn draw_slot(frame: &mut Frame, slot: &PageSlot, x: u32, y: u32, width: u32, height: u32) {
    if width == 0 || height == 0 {
        return;
    }
    match slot {
        PageSlot::Ready(raster) => match image::load_from_memory(&raster.payload) {
            Ok(decoded) => {
                let rgba = decoded.to_rgba8();
                blit_fitted(frame, &rgba, x, y, width, height);
                if raster.placeholder {
                    draw_border(frame, x, y, width, height, PLACEHOLDER_BORDER);
                }
            }
            Err(err) => {
                warn!(?err, "failed to decode page image, drawing error slot");
                draw_failed_slot(frame, x, y, width, height);
            }
        },
        PageSlot::Pending | PageSlot::Missing => {
            fill_region(frame, x, y, width, height, SLOT_LOADING);
        }
        PageSlot::Failed => draw_failed_slot(frame, x, y, width, height),
        PageSlot::Absent => fill_region(frame, x, y, width, height, SLOT_ABSENT),
    }
}

/// Scales the image to fit the slot, preserving aspect ratio, and centers it.
fn blit_fitted(frame: &mut Frame, image: &RgbaImage, x: u32, y: u32, width: u32, height: u32) {
    let (iw, ih) = image.dimensions();
    if iw == 0 || ih == 0 {
        return;
    }
    let scale = (width as f32 / iw as f32).min(height as f32 / ih as f32);
    let target_w = ((iw as f32 * scale).round() as u32).clamp(1, width);
    let target_h = ((ih as f32 * scale).round() as u32).clamp(1, height);
    let resized = image::imageops::resize(image, target_w, target_h, FilterType::Triangle);

    let offset_x = x + (width - target_w) / 2;
    let offset_y = y + (height - target_h) / 2;
    for (sy, row) in resized.rows().enumerate() {
        let dy = offset_y + sy as u32;
        if dy >= frame.height {
            break;
        }
        for (sx, pixel) in row.enumerate() {
            let dx = offset_x + sx as u32;
            if dx >= frame.width {
                break;
            }
            let idx = (dy as usize * frame.width as usize + dx as usize) * 4;
            frame.pixels[idx..idx + 4].copy_from_slice(&pixel.0);
        }
    }
}

fn fill_region(frame: &mut Frame, x: u32, y: u32, width: u32, height: u32, color: [u8; 4]) {
    let x1 = (x + width).min(frame.width);
    let y1 = (y + height).min(frame.height);
    for py in y..y1 {
        let row = py as usize * frame.width as usize * 4;
        for px in x..x1 {
            let idx = row + px as usize * 4;
            frame.pixels[idx..idx + 4].copy_from_slice(&color);
        }
    }
}

fn draw_failed_slot(frame: &mut Frame, x: u32, y: u32, width: u32, height: u32) {
    fill_region(frame, x, y, width, height, SLOT_FAILED);
    // Diagonal cross so the failure is visible at any slot size.
    let x1 = (x + width).min(frame.width);
    let y1 = (y + height).min(frame.height);
    let w = x1.saturating_sub(x).max(1);
    let h = y1.saturating_sub(y).max(1);
    for step in 0..w.max(h) {
        let px = x + step * w / w.max(h);
        let py = y + step * h / w.max(h);
        if px < x1 && py < y1 {
            set_pixel(frame, px, py, SLOT_FAILED_MARK);
            let mirror = x1 - 1 - (px - x);
            set_pixel(frame, mirror, py, SLOT_FAILED_MARK);
        }
    }
}

fn draw_border(frame: &mut Frame, x: u32, y: u32, width: u32, height: u32, color: [u8; 3]) {
    let x1 = (x + width).min(frame.width);
    let y1 = (y + height).min(frame.height);
    for px in x..x1 {
        set_pixel(frame, px, y, color);
        set_pixel(frame, px, y1.saturating_sub(1), color);
    }
    for py in y..y1 {
        set_pixel(frame, x, py, color);
        set_pixel(frame, x1.saturating_sub(1), py, color);
    }
}

fn set_pixel(frame: &mut Frame, x: u32, y: u32, color: [u8; 3]) {
    if x >= frame.width || y >= frame.height {
        return;
    }
    let idx = (y as usize * frame.width as usize + x as usize) * 4;
    frame.pixels[idx] = color[0];
    frame.pixels[idx + 1] = color[1];
    frame.pixels[idx + 2] = color[2];
}

/// Applies the zoom/pan transform by cropping the visible region out of the
/// composed frame and scaling it back up to the full frame size.
pub fn apply_transform(frame: &Frame, transform: &ViewportTransform) -> Frame {
    if transform.is_identity() {
        return frame.clone();
    }
    let viewport = Vec2::new(frame.width as f32, frame.height as f32);
    let region = transform.visible_region(viewport);

    let crop_w = (region.width.round() as u32).clamp(1, frame.width);
    let crop_h = (region.height.round() as u32).clamp(1, frame.height);
    let max_x = frame.width - crop_w;
    let max_y = frame.height - crop_h;
    let origin_x = (region.x.round().max(0.0) as u32).min(max_x);
    let origin_y = (region.y.round().max(0.0) as u32).min(max_y);

    let cropped = crop_frame(frame, origin_x, origin_y, crop_w, crop_h);
    let Some(buffer) = RgbaImage::from_raw(cropped.width, cropped.height, cropped.pixels) else {
        return frame.clone();
    };
    let scaled = image::imageops::resize(&buffer, frame.width, frame.height, FilterType::Nearest);
    Frame {
        width: frame.width,
        height: frame.height,
        pixels: scaled.into_raw(),
    }
}

fn crop_frame(frame: &Frame, origin_x: u32, origin_y: u32, width: u32, height: u32) -> Frame {
    let width = width.min(frame.width).max(1);
    let height = height.min(frame.height).max(1);
    let origin_x = origin_x.min(frame.width - width);
    let origin_y = origin_y.min(frame.height - height);

    let stride = frame.width as usize * 4;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for row in 0..height {
        let src_y = origin_y + row;
        let start = src_y as usize * stride + origin_x as usize * 4;
        let end = start + width as usize * 4;
        pixels.extend_from_slice(&frame.pixels[start..end]);
    }
    Frame {
        width,
        height,
        pixels,
    }
}

/// Overlays the live selection rectangle: translucent fill plus a solid
/// outline.
pub fn draw_selection(frame: &mut Frame, rect: &SelectionRect) {
    let x0 = rect.x.max(0.0) as u32;
    let y0 = rect.y.max(0.0) as u32;
    let x1 = ((rect.x + rect.width).max(0.0) as u32).min(frame.width);
    let y1 = ((rect.y + rect.height).max(0.0) as u32).min(frame.height);
    if x0 >= x1 || y0 >= y1 {
        return;
    }
    for y in y0..y1 {
        let row = y as usize * frame.width as usize * 4;
        for x in x0..x1 {
            let idx = row + x as usize * 4;
            blend_pixel(&mut frame.pixels[idx..idx + 4], SELECTION_FILL, 0.25);
        }
    }
    draw_border(frame, x0, y0, x1 - x0, y1 - y0, SELECTION_FILL);
}

/// Darkens the part of the frame the flip has swept over. A forward flip
/// sweeps in from the right edge, a backward flip from the left.
pub fn draw_flip_wipe(frame: &mut Frame, direction: FlipDirection, eased: f32) {
    let eased = eased.clamp(0.0, 1.0);
    let covered = (frame.width as f32 * eased).round() as u32;
    if covered == 0 {
        return;
    }
    let (x0, x1) = match direction {
        FlipDirection::Next => (frame.width.saturating_sub(covered), frame.width),
        FlipDirection::Prev => (0, covered.min(frame.width)),
    };
    for y in 0..frame.height {
        let row = y as usize * frame.width as usize * 4;
        for x in x0..x1 {
            let idx = row + x as usize * 4;
            blend_pixel(&mut frame.pixels[idx..idx + 4], FLIP_SHADE, 0.45);
        }
    }
}

fn blend_pixel(pixel: &mut [u8], color: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let inv = 1.0 - alpha;
    for channel in 0..3 {
        pixel[channel] = ((pixel[channel] as f32 * inv) + (color[channel] as f32 * alpha))
            .round()
            .clamp(0.0, 255.0) as u8;
    }
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn draw(&mut self, frame: &Frame, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, frame.width, frame.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&frame.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    frame.width,
                    frame.height,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates so the terminal presents everything
    /// buffered since `begin_sync_update`.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Command(Command),
    Resized,
    Quit,
    None,
}

const DOUBLE_CLICK_WINDOW: Duration = Duration::from_millis(400);
const DOUBLE_CLICK_RADIUS_PX: f32 = 10.0;

/// Translates crossterm events into viewer commands. Mouse positions arrive
/// in cells; the mapper converts them to pixels using the terminal's cell
/// size so gestures line up with the drawn frame.
#[derive(Debug)]
pub struct EventMapper {
    pending_digits: String,
    cell_size: Vec2,
    viewport_center: Vec2,
    last_click: Option<(Instant, Vec2)>,
}

impl Default for EventMapper {
    fn default() -> Self {
        Self {
            pending_digits: String::new(),
            cell_size: Vec2::new(8.0, 16.0),
            viewport_center: Vec2::new(400.0, 300.0),
            last_click: None,
        }
    }
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cell_size(&mut self, cell_size: Vec2) {
        if cell_size.x > 0.0 && cell_size.y > 0.0 {
            self.cell_size = cell_size;
        }
    }

    pub fn set_viewport_center(&mut self, center: Vec2) {
        self.viewport_center = center;
    }

    pub fn pending_input(&self) -> Option<String> {
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }

    pub fn map_event(&mut self, event: Event, now: Instant) -> UiEvent {
        match event {
            Event::Key(key) => self.map_key(key),
            Event::Mouse(mouse) => self.map_mouse(mouse, now),
            Event::Resize(_, _) => UiEvent::Resized,
            _ => UiEvent::None,
        }
    }

    fn map_key(&mut self, key: KeyEvent) -> UiEvent {
        let KeyEvent {
            code, modifiers, ..
        } = key;
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if self.pending_digits.len() < 9 {
                    self.pending_digits.push(c);
                }
                UiEvent::None
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) => {
                let page = self.take_digits().unwrap_or(1);
                UiEvent::Command(Command::GotoPage { page })
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                self.pending_digits.clear();
                UiEvent::Command(Command::GotoPage { page: u32::MAX })
            }
            (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Right, KeyModifiers::NONE)
            | (KeyCode::PageDown, _)
            | (KeyCode::Char(' '), KeyModifiers::NONE) => {
                self.pending_digits.clear();
                UiEvent::Command(Command::NextUnit)
            }
            (KeyCode::Char('k'), KeyModifiers::NONE)
            | (KeyCode::Left, KeyModifiers::NONE)
            | (KeyCode::PageUp, _) => {
                self.pending_digits.clear();
                UiEvent::Command(Command::PrevUnit)
            }
            (KeyCode::Char('b'), _) => {
                self.pending_digits.clear();
                UiEvent::Command(Command::ToggleMode)
            }
            (KeyCode::Char('='), _) => {
                self.pending_digits.clear();
                UiEvent::Command(Command::ResetTransform)
            }
            (KeyCode::Char('+'), _) => {
                self.pending_digits.clear();
                UiEvent::Command(Command::Wheel {
                    notches: 1.0,
                    cursor: self.viewport_center,
                })
            }
            (KeyCode::Char('-'), _) => {
                self.pending_digits.clear();
                UiEvent::Command(Command::Wheel {
                    notches: -1.0,
                    cursor: self.viewport_center,
                })
            }
            (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => {
                self.pending_digits.clear();
                UiEvent::Quit
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            _ => {
                self.pending_digits.clear();
                UiEvent::None
            }
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent, now: Instant) -> UiEvent {
        let position = self.cell_to_pixel(mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some((when, at)) = self.last_click.take() {
                    if now.duration_since(when) <= DOUBLE_CLICK_WINDOW
                        && (position - at).length() <= DOUBLE_CLICK_RADIUS_PX
                    {
                        return UiEvent::Command(Command::ResetTransform);
                    }
                }
                self.last_click = Some((now, position));
                UiEvent::Command(Command::PointerDown {
                    position,
                    pan_modifier: mouse.modifiers.contains(KeyModifiers::CONTROL),
                })
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                UiEvent::Command(Command::PointerMove { position })
            }
            MouseEventKind::Up(MouseButton::Left) => {
                UiEvent::Command(Command::PointerUp { position })
            }
            MouseEventKind::ScrollUp => UiEvent::Command(Command::Wheel {
                notches: 1.0,
                cursor: position,
            }),
            MouseEventKind::ScrollDown => UiEvent::Command(Command::Wheel {
                notches: -1.0,
                cursor: position,
            }),
            _ => UiEvent::None,
        }
    }

    fn cell_to_pixel(&self, column: u16, row: u16) -> Vec2 {
        Vec2::new(
            (column as f32 + 0.5) * self.cell_size.x,
            (row as f32 + 0.5) * self.cell_size.y,
        )
    }

    fn take_digits(&mut self) -> Option<u32> {
        let digits = std::mem::take(&mut self.pending_digits);
        digits.parse().ok().filter(|&page| page > 0)
    }
}
