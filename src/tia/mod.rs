//! TIA (Television Interface Adapter) emulation
//!
//! The chip is stepped one colour clock at a time. A scanline is 228 colour
//! clocks: 68 clocks of horizontal blank followed by 160 visible pixels.
//! Every visible clock the six graphics objects are evaluated, overlapping
//! pairs are latched into the collision register, and the colour of the
//! highest priority object is written to the line buffer. At the end of each
//! line the attached [`FrameTracker`] decides whether the line belongs to the
//! visible frame.
//!
//! Register writes go through a small delay queue, so that e.g. a playfield
//! write lands two pixels after the store that issued it.

pub mod audio;
pub mod objects;
pub mod palette;
pub mod registers;

use std::sync::Arc;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::audio::AudioQueue;
use crate::frame::{FrameSync, FrameTracker, FRAME_WIDTH, MAX_FRAME_HEIGHT};
use crate::savestate::Serializer;

use self::audio::TiaAudio;
use self::objects::{GraphicsObject, ObjectKind, BL, LINE_WIDTH, M0, M1, OBJECT_COUNT, P0, P1, PF};
use self::registers::*;

/// Colour clocks per scanline
pub const CLOCKS_PER_LINE: u8 = 228;

/// Colour clocks of horizontal blank
pub const HBLANK_CLOCKS: u8 = 68;

/// Horizontal blank after an HMOVE issued during blank
pub const HBLANK_CLOCKS_EXTENDED: u8 = HBLANK_CLOCKS + 8;

/// Colour clocks per CPU cycle
pub const CLOCKS_PER_CPU_CYCLE: u64 = 3;

/// Horizontal counter value loaded by RSYNC
const RSYNC_COUNTER: u8 = 225;

/// Motion clocks per HMOVE
const MOTION_CLOCKS: u8 = 16;

/// Object pairs in collision latch bit order
const COLLISION_PAIRS: [(usize, usize); 15] = [
    (M0, P1),
    (M0, P0),
    (M1, P0),
    (M1, P1),
    (P0, PF),
    (P0, BL),
    (P1, PF),
    (P1, BL),
    (M0, PF),
    (M0, BL),
    (M1, PF),
    (M1, BL),
    (BL, PF),
    (P0, P1),
    (M0, M1),
];

const ALL_OBJECTS: u8 = (1 << OBJECT_COUNT) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct PendingWrite {
    /// Clocks left before the write lands
    delay: u8,
    reg: u8,
    value: u8,
}

/// TIA chip state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tia {
    /// Colour clocks since reset
    clock: u64,

    /// Horizontal counter, 0..228
    hctr: u8,

    /// HMOVE blanked the first 8 pixels of this line
    extended_hblank: bool,

    objects: [GraphicsObject; OBJECT_COUNT],

    colup0: u8,
    colup1: u8,
    colupf: u8,
    colubk: u8,

    vsync: bool,
    vblank: bool,

    /// VBLANK bit 6
    input_latch_enabled: bool,

    /// VBLANK bit 7
    dump_paddles: bool,

    /// Latched collision pairs, one bit per `COLLISION_PAIRS` entry
    collisions: u16,

    pending: Vec<PendingWrite>,

    /// HMOVE in progress
    motion_active: bool,
    motion_clock: u8,

    /// WSYNC was written; the CPU must wait for the next line
    wsync_halt: bool,

    /// Last value seen on the data bus, drives the undriven read bits
    last_data_bus: u8,

    fire_pressed: [bool; 2],
    fire_latched: [bool; 2],
    paddle_charged: [bool; 4],

    frame_tracker: FrameTracker,

    /// Pixels of the line being drawn
    line: Vec<u8>,

    /// The current line drew something other than black
    line_content: bool,

    back_buffer: Vec<u8>,
    front_buffer: Vec<u8>,

    /// New frame available to the display
    frame_complete: bool,

    color_loss_enabled: bool,

    /// Colour loss applies to the frame being drawn
    color_loss_active: bool,

    /// Debug: objects drawn, one bit per object
    display_mask: u8,

    /// Debug: objects taking part in collisions
    collision_mask: u8,

    audio: TiaAudio,
}

impl Default for Tia {
    fn default() -> Self {
        Tia::new()
    }
}

impl Tia {
    pub fn new() -> Self {
        Tia {
            clock: 0,
            hctr: 0,
            extended_hblank: false,
            objects: [
                GraphicsObject::player(),
                GraphicsObject::player(),
                GraphicsObject::missile(),
                GraphicsObject::missile(),
                GraphicsObject::ball(),
                GraphicsObject::playfield(),
            ],
            colup0: 0,
            colup1: 0,
            colupf: 0,
            colubk: 0,
            vsync: false,
            vblank: false,
            input_latch_enabled: false,
            dump_paddles: false,
            collisions: 0,
            pending: Vec::new(),
            motion_active: false,
            motion_clock: 0,
            wsync_halt: false,
            last_data_bus: 0,
            fire_pressed: [false; 2],
            fire_latched: [false; 2],
            paddle_charged: [false; 4],
            frame_tracker: FrameTracker::default(),
            line: vec![0; FRAME_WIDTH],
            line_content: false,
            back_buffer: vec![0; FRAME_WIDTH * MAX_FRAME_HEIGHT],
            front_buffer: vec![0; FRAME_WIDTH * MAX_FRAME_HEIGHT],
            frame_complete: false,
            color_loss_enabled: false,
            color_loss_active: false,
            display_mask: ALL_OBJECTS,
            collision_mask: ALL_OBJECTS,
            audio: TiaAudio::new(),
        }
    }

    /// Power-on reset
    ///
    /// The attached frame tracker is reset in place and the audio queue stays
    /// attached. Debug toggles and the colour loss setting survive.
    pub fn reset(&mut self) {
        let mut tracker = std::mem::take(&mut self.frame_tracker);
        tracker.reset();

        let queue = self.audio.audio_queue().cloned();
        let (display_mask, collision_mask) = (self.display_mask, self.collision_mask);
        let color_loss = self.color_loss_enabled;

        *self = Tia::new();
        self.frame_tracker = tracker;
        self.audio.set_audio_queue(queue);
        self.display_mask = display_mask;
        self.collision_mask = collision_mask;
        self.color_loss_enabled = color_loss;

        debug!("TIA reset");
    }

    /// Run up to (not including) colour clock `target`
    pub fn advance(&mut self, target: u64) {
        while self.clock < target {
            self.tick();
        }
    }

    /// Advance by one colour clock
    pub fn tick(&mut self) {
        self.apply_delayed_writes();

        if self.motion_active && self.hctr & 0x03 == 0 && self.in_hblank() {
            self.motion_pulse();
        }

        if self.hctr >= HBLANK_CLOCKS {
            let x = self.hctr - HBLANK_CLOCKS;
            if self.in_hblank() {
                self.line[x as usize] = 0;
            } else {
                self.render_pixel(x);
            }
        }

        self.audio.tick();

        self.clock += 1;
        self.hctr += 1;
        if self.hctr >= CLOCKS_PER_LINE {
            self.next_line();
        }
    }

    fn in_hblank(&self) -> bool {
        let end = if self.extended_hblank {
            HBLANK_CLOCKS_EXTENDED
        } else {
            HBLANK_CLOCKS
        };
        self.hctr < end
    }

    fn motion_pulse(&mut self) {
        for object in self.objects.iter_mut() {
            object.motion_tick(self.motion_clock);
        }

        self.motion_clock += 1;
        if self.motion_clock >= MOTION_CLOCKS {
            self.motion_active = false;
        }
    }

    fn render_pixel(&mut self, x: u8) {
        let mut active = 0u8;
        for (index, object) in self.objects.iter().enumerate() {
            if object.pixel(x) {
                active |= 1 << index;
            }
        }

        let colliding = active & self.collision_mask;
        if colliding.count_ones() >= 2 {
            for (bit, &(a, b)) in COLLISION_PAIRS.iter().enumerate() {
                if colliding & (1 << a) != 0 && colliding & (1 << b) != 0 {
                    self.collisions |= 1 << bit;
                }
            }
        }

        let displayed = active & self.display_mask;
        let color = if self.vblank {
            0
        } else {
            if displayed != 0 || self.colubk != 0 {
                self.line_content = true;
            }
            self.resolve_color(displayed, x)
        };

        self.line[x as usize] = if self.color_loss_active {
            color | 0x01
        } else {
            color
        };

        for object in self.objects.iter_mut() {
            object.clock();
        }
        self.sync_locked_missiles();
    }

    fn resolve_color(&self, displayed: u8, x: u8) -> u8 {
        let has = |index: usize| displayed & (1 << index) != 0;
        let playfield = self.playfield();

        let playfield_color = if playfield.score && !playfield.priority {
            if x < LINE_WIDTH / 2 {
                self.colup0
            } else {
                self.colup1
            }
        } else {
            self.colupf
        };

        let front = |tia: &Tia| -> Option<u8> {
            if has(BL) {
                Some(tia.colupf)
            } else if has(PF) {
                Some(playfield_color)
            } else {
                None
            }
        };

        let players = |tia: &Tia| -> Option<u8> {
            if has(P0) || has(M0) {
                Some(tia.colup0)
            } else if has(P1) || has(M1) {
                Some(tia.colup1)
            } else {
                None
            }
        };

        let color = if playfield.priority {
            front(self).or_else(|| players(self))
        } else {
            players(self).or_else(|| front(self))
        };

        color.unwrap_or(self.colubk)
    }

    fn next_line(&mut self) {
        if self.frame_tracker.is_rendering() {
            let row = self.frame_tracker.current_row() as usize;
            if row < MAX_FRAME_HEIGHT {
                let start = row * FRAME_WIDTH;
                self.back_buffer[start..start + FRAME_WIDTH].copy_from_slice(&self.line);
            }
        }

        self.frame_tracker.on_next_line(self.line_content);
        self.line_content = false;

        self.hctr = 0;
        self.extended_hblank = false;

        self.check_frame_complete();
    }

    fn check_frame_complete(&mut self) {
        if !self.frame_tracker.take_frame_complete() {
            return;
        }

        std::mem::swap(&mut self.front_buffer, &mut self.back_buffer);
        self.back_buffer.fill(0);
        self.frame_complete = true;

        let lines = self.frame_tracker.scanlines_last_frame();
        self.color_loss_active = self.color_loss_enabled && lines % 2 == 1;

        trace!("TIA frame {} complete", self.frame_tracker.frame_count());
    }

    fn apply_delayed_writes(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let mut due = Vec::new();
        self.pending.retain_mut(|write| {
            if write.delay == 0 {
                due.push((write.reg, write.value));
                false
            } else {
                write.delay -= 1;
                true
            }
        });

        for (reg, value) in due {
            self.apply_write(reg, value);
        }
    }

    /// Write to a chip register; `addr` is decoded through the mirror mask
    pub fn poke(&mut self, addr: u16, value: u8) {
        let reg = (addr & WRITE_MASK) as u8;
        self.last_data_bus = value;

        if !is_mapped(reg) {
            return;
        }

        match write_delay(reg) {
            0 => self.apply_write(reg, value),
            delay => self.pending.push(PendingWrite { delay, reg, value }),
        }
    }

    fn apply_write(&mut self, reg: u8, value: u8) {
        match reg {
            VSYNC => self.set_vsync(value & 0x02 != 0),
            VBLANK => self.set_vblank(value),
            WSYNC => self.wsync_halt = true,
            RSYNC => self.hctr = RSYNC_COUNTER,
            NUSIZ0 | NUSIZ1 => {
                let (player, missile) = if reg == NUSIZ0 { (P0, M0) } else { (P1, M1) };
                if let ObjectKind::Player(p) = &mut self.objects[player].kind {
                    p.nusiz = value;
                }
                if let ObjectKind::Missile(m) = &mut self.objects[missile].kind {
                    m.nusiz = value;
                }
            }
            COLUP0 => self.colup0 = value & 0xfe,
            COLUP1 => self.colup1 = value & 0xfe,
            COLUPF => self.colupf = value & 0xfe,
            COLUBK => self.colubk = value & 0xfe,
            CTRLPF => {
                if let ObjectKind::Playfield(pf) = &mut self.objects[PF].kind {
                    pf.reflect = value & 0x01 != 0;
                    pf.score = value & 0x02 != 0;
                    pf.priority = value & 0x04 != 0;
                }
                if let ObjectKind::Ball(ball) = &mut self.objects[BL].kind {
                    ball.width = 1 << ((value >> 4) & 0x03);
                }
            }
            REFP0 | REFP1 => {
                let index = if reg == REFP0 { P0 } else { P1 };
                if let ObjectKind::Player(p) = &mut self.objects[index].kind {
                    p.reflect = value & 0x08 != 0;
                }
            }
            PF0 | PF1 | PF2 => {
                if let ObjectKind::Playfield(pf) = &mut self.objects[PF].kind {
                    match reg {
                        PF0 => pf.set_pf0(value),
                        PF1 => pf.set_pf1(value),
                        _ => pf.set_pf2(value),
                    }
                }
            }
            RESP0 | RESP1 | RESM0 | RESM1 | RESBL => {
                let hblank = self.in_hblank();
                self.objects[(reg - RESP0) as usize].reset_position(hblank);
            }
            AUDC0 => self.audio.channel0().set_audc(value),
            AUDC1 => self.audio.channel1().set_audc(value),
            AUDF0 => self.audio.channel0().set_audf(value),
            AUDF1 => self.audio.channel1().set_audf(value),
            AUDV0 => self.audio.channel0().set_audv(value),
            AUDV1 => self.audio.channel1().set_audv(value),
            GRP0 => {
                if let ObjectKind::Player(p) = &mut self.objects[P0].kind {
                    p.pattern_new = value;
                }
                if let ObjectKind::Player(p) = &mut self.objects[P1].kind {
                    p.pattern_old = p.pattern_new;
                }
            }
            GRP1 => {
                if let ObjectKind::Player(p) = &mut self.objects[P1].kind {
                    p.pattern_new = value;
                }
                if let ObjectKind::Player(p) = &mut self.objects[P0].kind {
                    p.pattern_old = p.pattern_new;
                }
                if let ObjectKind::Ball(ball) = &mut self.objects[BL].kind {
                    ball.enabled_old = ball.enabled_new;
                }
            }
            ENAM0 | ENAM1 => {
                let index = if reg == ENAM0 { M0 } else { M1 };
                if let ObjectKind::Missile(m) = &mut self.objects[index].kind {
                    m.enabled = value & 0x02 != 0;
                }
            }
            ENABL => {
                if let ObjectKind::Ball(ball) = &mut self.objects[BL].kind {
                    ball.enabled_new = value & 0x02 != 0;
                }
            }
            HMP0 | HMP1 | HMM0 | HMM1 | HMBL => {
                self.objects[(reg - HMP0) as usize].set_motion(value);
            }
            VDELP0 | VDELP1 => {
                let index = if reg == VDELP0 { P0 } else { P1 };
                if let ObjectKind::Player(p) = &mut self.objects[index].kind {
                    p.vdel = value & 0x01 != 0;
                }
            }
            VDELBL => {
                if let ObjectKind::Ball(ball) = &mut self.objects[BL].kind {
                    ball.vdel = value & 0x01 != 0;
                }
            }
            RESMP0 | RESMP1 => {
                let index = if reg == RESMP0 { M0 } else { M1 };
                if let ObjectKind::Missile(m) = &mut self.objects[index].kind {
                    m.locked = value & 0x02 != 0;
                }
                self.sync_locked_missiles();
            }
            HMOVE => self.start_hmove(),
            HMCLR => {
                for object in self.objects[..PF].iter_mut() {
                    object.set_motion(0);
                }
            }
            CXCLR => self.collisions = 0,
            _ => {}
        }
    }

    fn set_vsync(&mut self, enabled: bool) {
        if enabled == self.vsync {
            return;
        }
        self.vsync = enabled;
        self.frame_tracker.on_vsync(enabled);
        self.check_frame_complete();
    }

    fn set_vblank(&mut self, value: u8) {
        let blank = value & 0x02 != 0;
        if blank != self.vblank {
            self.vblank = blank;
            self.frame_tracker.on_vblank(blank);
        }

        let latch = value & 0x40 != 0;
        if latch && !self.input_latch_enabled {
            self.fire_latched = self.fire_pressed;
        } else if !latch {
            self.fire_latched = [false; 2];
        }
        self.input_latch_enabled = latch;

        self.dump_paddles = value & 0x80 != 0;
    }

    fn start_hmove(&mut self) {
        if self.in_hblank() {
            self.extended_hblank = true;
        }

        self.motion_active = true;
        self.motion_clock = 0;
        for object in self.objects.iter_mut() {
            object.start_motion();
        }
    }

    /// Keep RESMP-locked missiles centred on their player
    fn sync_locked_missiles(&mut self) {
        for (missile, player) in [(M0, P0), (M1, P1)] {
            let locked = matches!(self.objects[missile].kind, ObjectKind::Missile(m) if m.locked);
            if !locked {
                continue;
            }

            let offset = match self.objects[player].kind {
                ObjectKind::Player(p) => p.center_offset(),
                _ => 0,
            };
            let width = LINE_WIDTH as u16;
            let counter = self.objects[player].counter() as u16;
            let position = (counter + width - offset as u16) % width;
            self.objects[missile].set_counter(position as u8);
        }
    }

    /// Read a chip register; `addr` is decoded through the mirror mask
    ///
    /// Only bits 7 and 6 are driven by the chip; the rest float at the last
    /// value seen on the data bus.
    pub fn peek(&mut self, addr: u16) -> u8 {
        let reg = (addr & READ_MASK) as u8;

        let value = match reg {
            CXM0P..=CXPPMM => self.collision_register(reg),
            INPT0..=INPT3 => {
                let charged = self.paddle_charged[(reg - INPT0) as usize];
                if !self.dump_paddles && charged {
                    0x80
                } else {
                    0
                }
            }
            INPT4 | INPT5 => {
                let index = (reg - INPT4) as usize;
                let low = self.fire_pressed[index]
                    || (self.input_latch_enabled && self.fire_latched[index]);
                if low {
                    0
                } else {
                    0x80
                }
            }
            _ => 0,
        };

        (value & 0xc0) | (self.last_data_bus & 0x3f)
    }

    fn collision_register(&self, reg: u8) -> u8 {
        let bit = |pair: u8| ((self.collisions >> pair) & 1) as u8;
        match reg {
            CXBLPF => bit(12) << 7,
            CXPPMM => (bit(13) << 7) | (bit(14) << 6),
            _ => (bit(2 * reg) << 7) | (bit(2 * reg + 1) << 6),
        }
    }

    /// Record the value of a bus access the chip did not drive
    pub fn set_data_bus(&mut self, value: u8) {
        self.last_data_bus = value;
    }

    /// Consume the WSYNC request
    pub fn take_wsync_halt(&mut self) -> bool {
        std::mem::take(&mut self.wsync_halt)
    }

    /// Colour clocks left in the current line
    pub fn clocks_to_line_end(&self) -> u8 {
        CLOCKS_PER_LINE - self.hctr
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn hctr(&self) -> u8 {
        self.hctr
    }

    pub fn object(&self, index: usize) -> &GraphicsObject {
        &self.objects[index]
    }

    fn playfield(&self) -> objects::PlayfieldGraphics {
        match self.objects[PF].kind {
            ObjectKind::Playfield(pf) => pf,
            _ => objects::PlayfieldGraphics::default(),
        }
    }

    /// Raw collision latches, bit `n` for pair `n`
    pub fn collisions(&self) -> u16 {
        self.collisions
    }

    /// Latch the state of fire button `index` (0 or 1)
    pub fn set_fire_button(&mut self, index: usize, pressed: bool) {
        if let Some(state) = self.fire_pressed.get_mut(index) {
            *state = pressed;
            if pressed && self.input_latch_enabled {
                self.fire_latched[index] = true;
            }
        }
    }

    /// Whether paddle capacitor `index` (0..4) has charged
    pub fn set_paddle_charged(&mut self, index: usize, charged: bool) {
        if let Some(state) = self.paddle_charged.get_mut(index) {
            *state = charged;
        }
    }

    // Frame tracking

    /// Attach a different frame tracker and get the previous one back
    pub fn set_frame_tracker(&mut self, tracker: FrameTracker) -> FrameTracker {
        std::mem::replace(&mut self.frame_tracker, tracker)
    }

    pub fn frame_tracker(&self) -> &FrameTracker {
        &self.frame_tracker
    }

    pub fn frame_tracker_mut(&mut self) -> &mut FrameTracker {
        &mut self.frame_tracker
    }

    /// Consume the new-frame signal
    pub fn take_frame_complete(&mut self) -> bool {
        std::mem::take(&mut self.frame_complete)
    }

    /// Last completed frame, `height` rows of colour indices
    pub fn frame_buffer(&self) -> &[u8] {
        let height = (self.frame_tracker.height() as usize).min(MAX_FRAME_HEIGHT);
        &self.front_buffer[..height * FRAME_WIDTH]
    }

    pub fn frame_height(&self) -> u32 {
        self.frame_tracker.height()
    }

    /// Line buffer; holds the previous line while in horizontal blank
    pub fn scanline(&self) -> &[u8] {
        &self.line
    }

    pub fn scanlines(&self) -> u32 {
        self.frame_tracker.current_line()
    }

    pub fn scanlines_last_frame(&self) -> u32 {
        self.frame_tracker.scanlines_last_frame()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_tracker.frame_count()
    }

    // Colour loss and debug toggles

    pub fn set_color_loss(&mut self, enabled: bool) {
        self.color_loss_enabled = enabled;
        if !enabled {
            self.color_loss_active = false;
        }
    }

    pub fn color_loss_enabled(&self) -> bool {
        self.color_loss_enabled
    }

    /// Show or hide one object in the rendered output
    pub fn set_object_visible(&mut self, index: usize, visible: bool) {
        set_mask_bit(&mut self.display_mask, index, visible);
    }

    pub fn set_all_objects_visible(&mut self, visible: bool) {
        self.display_mask = if visible { ALL_OBJECTS } else { 0 };
    }

    /// Flip one object's visibility, returning the new state
    pub fn toggle_object(&mut self, index: usize) -> bool {
        let visible = self.display_mask & (1 << index) == 0;
        self.set_object_visible(index, visible);
        visible
    }

    /// Include or exclude one object from collision detection
    pub fn set_object_collisions(&mut self, index: usize, enabled: bool) {
        set_mask_bit(&mut self.collision_mask, index, enabled);
    }

    pub fn set_all_collisions(&mut self, enabled: bool) {
        self.collision_mask = if enabled { ALL_OBJECTS } else { 0 };
    }

    pub fn toggle_collisions(&mut self, index: usize) -> bool {
        let enabled = self.collision_mask & (1 << index) == 0;
        self.set_object_collisions(index, enabled);
        enabled
    }

    // Audio

    pub fn set_audio_queue(&mut self, queue: Option<Arc<AudioQueue>>) {
        self.audio.set_audio_queue(queue);
    }

    /// Detach and return the audio queue
    pub fn detach_audio(&mut self) -> Option<Arc<AudioQueue>> {
        let queue = self.audio.audio_queue().cloned();
        self.audio.set_audio_queue(None);
        queue
    }

    pub fn audio(&self) -> &TiaAudio {
        &self.audio
    }

    // Snapshots

    pub fn save(&self, out: &mut Serializer) -> bool {
        match out.put(self) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to save TIA state: {}", e);
                false
            }
        }
    }

    /// Restore from a snapshot; on failure the chip is left untouched
    pub fn load(&mut self, input: &mut Serializer) -> bool {
        match input.get::<Tia>() {
            Ok(state) => {
                let queue = self.audio.audio_queue().cloned();
                *self = state;
                self.audio.set_audio_queue(queue);
                true
            }
            Err(e) => {
                warn!("Failed to load TIA state: {}", e);
                false
            }
        }
    }
}

fn set_mask_bit(mask: &mut u8, index: usize, set: bool) {
    if index >= OBJECT_COUNT {
        return;
    }
    if set {
        *mask |= 1 << index;
    } else {
        *mask &= !(1 << index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run to the start of the next line
    fn finish_line(tia: &mut Tia) {
        let target = tia.clock() + tia.clocks_to_line_end() as u64;
        tia.advance(target);
    }

    fn drawn(tia: &Tia) -> Vec<usize> {
        tia.scanline()
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c != 0)
            .map(|(x, _)| x)
            .collect()
    }

    fn state_bytes(tia: &Tia) -> Vec<u8> {
        bincode::serde::encode_to_vec(tia, bincode::config::standard()).unwrap()
    }

    #[test]
    fn test_ball_after_reset() {
        let mut tia = Tia::new();
        tia.poke(COLUPF as u16, 0x1e);
        tia.poke(ENABL as u16, 0x02);
        tia.advance(CLOCKS_PER_LINE as u64);

        assert_eq!(tia.hctr(), 0);
        assert_eq!(drawn(&tia), vec![80]);
        assert_eq!(tia.scanline()[80], 0x1e);
    }

    #[test]
    fn test_ball_width_from_ctrlpf() {
        let mut tia = Tia::new();
        tia.poke(COLUPF as u16, 0x1e);
        tia.poke(CTRLPF as u16, 0x30);
        tia.poke(ENABL as u16, 0x02);
        tia.advance(CLOCKS_PER_LINE as u64);

        assert_eq!(drawn(&tia), (80..88).collect::<Vec<_>>());
    }

    #[test]
    fn test_reset_position_during_display() {
        let mut tia = Tia::new();
        tia.poke(COLUP0 as u16, 0x44);
        tia.poke(GRP0 as u16, 0x80);

        // Strobe at pixel 40; players appear 5 clocks later
        tia.advance((HBLANK_CLOCKS + 40) as u64);
        tia.poke(RESP0 as u16, 0);
        finish_line(&mut tia);
        finish_line(&mut tia);

        assert_eq!(drawn(&tia), vec![45]);
    }

    #[test]
    fn test_hmove_shifts_left() {
        let mut tia = Tia::new();
        tia.poke(COLUPF as u16, 0x1e);
        tia.poke(ENABL as u16, 0x02);
        tia.poke(HMBL as u16, 0x30);
        tia.poke(HMOVE as u16, 0);

        finish_line(&mut tia);
        // First 8 pixels blanked by the extended hblank
        assert!(tia.scanline()[..8].iter().all(|&c| c == 0));
        assert_eq!(drawn(&tia), vec![77]);

        finish_line(&mut tia);
        assert_eq!(drawn(&tia), vec![77]);
    }

    #[test]
    fn test_repeated_hmove_accumulates() {
        for (value, motion) in [(0x10u8, 1i32), (0x70, 7), (0xf0, -1), (0x80, -8)] {
            let mut tia = Tia::new();
            let start = tia.object(BL).position() as i32;

            tia.poke(HMBL as u16, value);
            for _ in 0..5 {
                tia.poke(HMOVE as u16, 0);
                finish_line(&mut tia);
            }

            let expected = (start - 5 * motion).rem_euclid(LINE_WIDTH as i32);
            assert_eq!(tia.object(BL).position() as i32, expected, "HMBL {:#04x}", value);
        }
    }

    #[test]
    fn test_collisions_are_sticky() {
        let mut tia = Tia::new();
        tia.poke(GRP0 as u16, 0xff);
        tia.poke(GRP1 as u16, 0xff);
        finish_line(&mut tia);

        // Both players power on at the same counter
        assert_eq!(tia.peek(CXPPMM as u16) & 0x80, 0x80);

        tia.poke(GRP0 as u16, 0);
        tia.poke(GRP1 as u16, 0);
        finish_line(&mut tia);
        assert_eq!(tia.peek(CXPPMM as u16) & 0x80, 0x80);

        tia.poke(CXCLR as u16, 0);
        assert_eq!(tia.peek(CXPPMM as u16) & 0xc0, 0);
    }

    #[test]
    fn test_collisions_latch_during_vblank() {
        let mut tia = Tia::new();
        tia.poke(VBLANK as u16, 0x02);
        tia.poke(GRP0 as u16, 0xff);
        tia.poke(ENABL as u16, 0x02);
        finish_line(&mut tia);

        assert!(drawn(&tia).is_empty());
        assert_eq!(tia.peek(CXP0FB as u16) & 0x40, 0x40);
    }

    #[test]
    fn test_collision_mask() {
        let mut tia = Tia::new();
        tia.set_object_collisions(P1, false);
        tia.poke(GRP0 as u16, 0xff);
        tia.poke(GRP1 as u16, 0xff);
        finish_line(&mut tia);
        assert_eq!(tia.collisions(), 0);
    }

    #[test]
    fn test_priority() {
        let mut tia = Tia::new();
        tia.poke(COLUP0 as u16, 0x40);
        tia.poke(COLUPF as u16, 0x80);
        tia.poke(PF0 as u16, 0xf0);
        tia.poke(PF1 as u16, 0xff);
        tia.poke(PF2 as u16, 0xff);
        tia.poke(GRP0 as u16, 0xff);
        finish_line(&mut tia);
        assert_eq!(tia.scanline()[80], 0x40);

        tia.poke(CTRLPF as u16, 0x04);
        finish_line(&mut tia);
        assert_eq!(tia.scanline()[80], 0x80);
    }

    #[test]
    fn test_score_mode() {
        let mut tia = Tia::new();
        tia.poke(COLUP0 as u16, 0x40);
        tia.poke(COLUP1 as u16, 0x60);
        tia.poke(CTRLPF as u16, 0x02);
        tia.poke(PF0 as u16, 0x10);
        finish_line(&mut tia);

        assert_eq!(tia.scanline()[0], 0x40);
        assert_eq!(tia.scanline()[80], 0x60);
    }

    #[test]
    fn test_display_toggle() {
        let mut tia = Tia::new();
        tia.poke(COLUPF as u16, 0x1e);
        tia.poke(ENABL as u16, 0x02);
        assert!(!tia.toggle_object(BL));
        finish_line(&mut tia);
        assert!(drawn(&tia).is_empty());
    }

    #[test]
    fn test_write_delay() {
        let mut tia = Tia::new();
        tia.poke(COLUPF as u16, 0x1e);

        // PF0 lands two clocks after the write
        tia.advance((HBLANK_CLOCKS - 1) as u64);
        tia.poke(PF0 as u16, 0x10);
        finish_line(&mut tia);

        let drawn = drawn(&tia);
        assert_eq!(drawn.first(), Some(&1));
    }

    #[test]
    fn test_register_mirrors() {
        let mut canonical = Tia::new();
        let mut mirrored = Tia::new();

        for (reg, value) in [(GRP0, 0xaa), (COLUP0, 0x36), (NUSIZ0, 0x05), (HMP0, 0x20)] {
            canonical.poke(reg as u16, value);
            mirrored.poke(reg as u16 | 0x40 | 0x0100 | 0x0c00, value);
        }
        canonical.advance(500);
        mirrored.advance(500);

        assert_eq!(state_bytes(&canonical), state_bytes(&mirrored));
        assert_eq!(canonical.peek(CXM0P as u16), mirrored.peek(CXM0P as u16 | 0x30));
    }

    #[test]
    fn test_unmapped_writes_ignored() {
        let mut tia = Tia::new();
        let before = state_bytes(&tia);
        tia.poke(0x2d, 0xff);
        tia.poke(0x3f, 0xff);
        tia.set_data_bus(0);
        assert_eq!(state_bytes(&tia), before);
    }

    #[test]
    fn test_read_undriven_bits() {
        let mut tia = Tia::new();
        tia.set_data_bus(0x2a);
        assert_eq!(tia.peek(INPT4 as u16), 0x80 | 0x2a);

        tia.set_fire_button(0, true);
        assert_eq!(tia.peek(INPT4 as u16) & 0x80, 0);
    }

    #[test]
    fn test_fire_button_latch() {
        let mut tia = Tia::new();
        tia.poke(VBLANK as u16, 0x40);
        tia.advance(2);

        tia.set_fire_button(1, true);
        tia.set_fire_button(1, false);
        assert_eq!(tia.peek(INPT5 as u16) & 0x80, 0);

        tia.poke(VBLANK as u16, 0x00);
        tia.advance(4);
        assert_eq!(tia.peek(INPT5 as u16) & 0x80, 0x80);
    }

    #[test]
    fn test_paddle_dump() {
        let mut tia = Tia::new();
        tia.set_paddle_charged(2, true);
        assert_eq!(tia.peek(INPT2 as u16) & 0x80, 0x80);

        tia.poke(VBLANK as u16, 0x80);
        tia.advance(2);
        assert_eq!(tia.peek(INPT2 as u16) & 0x80, 0);
    }

    #[test]
    fn test_wsync_and_rsync() {
        let mut tia = Tia::new();
        tia.advance(10);
        tia.poke(WSYNC as u16, 0);
        assert!(tia.take_wsync_halt());
        assert!(!tia.take_wsync_halt());

        tia.poke(RSYNC as u16, 0);
        assert_eq!(tia.clocks_to_line_end(), 3);
    }

    #[test]
    fn test_resmp_centres_missile() {
        let mut tia = Tia::new();
        tia.poke(RESMP0 as u16, 0x02);
        tia.advance(1);

        let player = tia.object(P0).position();
        assert_eq!(tia.object(M0).position(), (player + 3) % LINE_WIDTH);

        tia.poke(COLUP0 as u16, 0x40);
        tia.poke(ENAM0 as u16, 0x02);
        finish_line(&mut tia);
        assert!(drawn(&tia).is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut tia = Tia::new();
        tia.poke(GRP0 as u16, 0x3c);
        tia.poke(HMP0 as u16, 0x40);
        tia.poke(HMOVE as u16, 0);
        tia.poke(AUDV0 as u16, 0x0f);
        tia.advance(1000);

        let mut snapshot = Serializer::new();
        assert!(tia.save(&mut snapshot));
        let saved = state_bytes(&tia);

        tia.poke(GRP0 as u16, 0);
        tia.poke(CXCLR as u16, 0);
        tia.advance(5000);
        assert_ne!(state_bytes(&tia), saved);

        snapshot.rewind();
        assert!(tia.load(&mut snapshot));
        assert_eq!(state_bytes(&tia), saved);
    }

    #[test]
    fn test_failed_load_keeps_state() {
        let mut tia = Tia::new();
        tia.advance(300);
        let before = state_bytes(&tia);

        let mut empty = Serializer::new();
        assert!(!tia.load(&mut empty));
        assert_eq!(state_bytes(&tia), before);
    }
}
