//! Graphics objects
//!
//! Players, missiles, the ball and the playfield share one record type with a
//! per-kind payload. Movable objects carry a horizontal counter that is
//! clocked once per visible colour clock (and once per extra motion clock
//! during HMOVE); an object draws its first pixel when the counter is 0.

use serde::{Deserialize, Serialize};

/// Visible pixels per line
pub const LINE_WIDTH: u8 = 160;

/// Counter value at power on (object at pixel 80)
pub const POWER_ON_COUNTER: u8 = 80;

pub const P0: usize = 0;
pub const P1: usize = 1;
pub const M0: usize = 2;
pub const M1: usize = 3;
pub const BL: usize = 4;
pub const PF: usize = 5;

pub const OBJECT_COUNT: usize = 6;

/// Copy start offsets selected by NUSIZ bits 0-2
fn copy_offsets(nusiz: u8) -> &'static [u8] {
    match nusiz & 0x07 {
        1 => &[0, 16],
        2 => &[0, 32],
        3 => &[0, 16, 32],
        4 => &[0, 64],
        6 => &[0, 32, 64],
        _ => &[0],
    }
}

/// Pixels per player bit
fn player_scale(nusiz: u8) -> u8 {
    match nusiz & 0x07 {
        5 => 2,
        7 => 4,
        _ => 1,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerGraphics {
    /// Last value written to GRPx
    pub pattern_new: u8,

    /// Copy of `pattern_new` taken when the other player's GRP is written
    pub pattern_old: u8,

    /// VDELPx: draw the old pattern
    pub vdel: bool,

    /// REFPx: draw LSB first
    pub reflect: bool,

    pub nusiz: u8,
}

impl PlayerGraphics {
    pub fn pattern(&self) -> u8 {
        if self.vdel {
            self.pattern_old
        } else {
            self.pattern_new
        }
    }

    /// Pixels from the copy start to the center, for RESMPx
    pub fn center_offset(&self) -> u8 {
        match player_scale(self.nusiz) {
            2 => 6,
            4 => 10,
            _ => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissileGraphics {
    /// ENAMx bit 1
    pub enabled: bool,

    /// NUSIZx of the owning player (bits 4-5 are the width)
    pub nusiz: u8,

    /// RESMPx: hidden and following the player
    pub locked: bool,
}

impl MissileGraphics {
    pub fn width(&self) -> u8 {
        1 << ((self.nusiz >> 4) & 0x03)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallGraphics {
    /// Last value written to ENABL
    pub enabled_new: bool,

    /// Copy of `enabled_new` taken when GRP1 is written
    pub enabled_old: bool,

    pub vdel: bool,

    /// Width from CTRLPF bits 4-5
    pub width: u8,
}

impl BallGraphics {
    pub fn enabled(&self) -> bool {
        if self.vdel {
            self.enabled_old
        } else {
            self.enabled_new
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayfieldGraphics {
    pub pf0: u8,
    pub pf1: u8,
    pub pf2: u8,

    /// 20 playfield bits, leftmost first
    pub pattern: u32,

    /// CTRLPF bit 0: right half mirrors the left
    pub reflect: bool,

    /// CTRLPF bit 1: halves take the player colours
    pub score: bool,

    /// CTRLPF bit 2: playfield and ball in front of players
    pub priority: bool,
}

impl PlayfieldGraphics {
    fn rebuild(&mut self) {
        let mut pattern = ((self.pf0 >> 4) & 0x0f) as u32;
        pattern |= (self.pf1.reverse_bits() as u32) << 4;
        pattern |= (self.pf2 as u32) << 12;
        self.pattern = pattern;
    }

    pub fn set_pf0(&mut self, value: u8) {
        self.pf0 = value;
        self.rebuild();
    }

    pub fn set_pf1(&mut self, value: u8) {
        self.pf1 = value;
        self.rebuild();
    }

    pub fn set_pf2(&mut self, value: u8) {
        self.pf2 = value;
        self.rebuild();
    }

    /// Playfield bit covering pixel `x`
    pub fn bit_at(&self, x: u8) -> bool {
        let index = if x < 80 {
            x / 4
        } else if self.reflect {
            19 - (x - 80) / 4
        } else {
            (x - 80) / 4
        };
        (self.pattern >> index) & 1 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Player(PlayerGraphics),
    Missile(MissileGraphics),
    Ball(BallGraphics),
    Playfield(PlayfieldGraphics),
}

/// One graphics object of the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicsObject {
    pub kind: ObjectKind,

    /// Horizontal counter, 0..160
    counter: u8,

    /// Motion clocks requested by HMxx (nibble ^ 8)
    hmm_clocks: u8,

    /// Still receiving motion clocks from the current HMOVE
    moving: bool,
}

impl GraphicsObject {
    pub fn new(kind: ObjectKind) -> Self {
        GraphicsObject {
            kind,
            counter: POWER_ON_COUNTER,
            hmm_clocks: 8,
            moving: false,
        }
    }

    pub fn player() -> Self {
        Self::new(ObjectKind::Player(PlayerGraphics::default()))
    }

    pub fn missile() -> Self {
        Self::new(ObjectKind::Missile(MissileGraphics::default()))
    }

    pub fn ball() -> Self {
        Self::new(ObjectKind::Ball(BallGraphics {
            width: 1,
            ..BallGraphics::default()
        }))
    }

    pub fn playfield() -> Self {
        Self::new(ObjectKind::Playfield(PlayfieldGraphics::default()))
    }

    fn is_movable(&self) -> bool {
        !matches!(self.kind, ObjectKind::Playfield(_))
    }

    /// Whether the object covers pixel `x` at the current counter
    pub fn pixel(&self, x: u8) -> bool {
        match &self.kind {
            ObjectKind::Player(player) => {
                let pattern = player.pattern();
                if pattern == 0 {
                    return false;
                }

                let scale = player_scale(player.nusiz);
                copy_offsets(player.nusiz).iter().any(|&start| {
                    let delta = self.delta(start);
                    if delta >= 8 * scale {
                        return false;
                    }
                    let bit = delta / scale;
                    let mask = if player.reflect { 1 << bit } else { 0x80 >> bit };
                    pattern & mask != 0
                })
            }
            ObjectKind::Missile(missile) => {
                if !missile.enabled || missile.locked {
                    return false;
                }
                let width = missile.width();
                copy_offsets(missile.nusiz)
                    .iter()
                    .any(|&start| self.delta(start) < width)
            }
            ObjectKind::Ball(ball) => ball.enabled() && self.counter < ball.width,
            ObjectKind::Playfield(playfield) => playfield.bit_at(x),
        }
    }

    /// Distance from the start of the copy at `start`
    fn delta(&self, start: u8) -> u8 {
        ((self.counter as u16 + LINE_WIDTH as u16 - start as u16) % LINE_WIDTH as u16) as u8
    }

    /// Advance the counter by one clock
    pub fn clock(&mut self) {
        if self.is_movable() {
            self.counter = (self.counter + 1) % LINE_WIDTH;
        }
    }

    /// Pixel at which the object starts when the line begins with the
    /// current counter value
    pub fn position(&self) -> u8 {
        (LINE_WIDTH - self.counter) % LINE_WIDTH
    }

    /// Place the object so it starts at pixel `position` of a line that
    /// has not started clocking yet
    pub fn set_position(&mut self, position: u8) {
        self.counter = (LINE_WIDTH - position % LINE_WIDTH) % LINE_WIDTH;
    }

    pub fn counter(&self) -> u8 {
        self.counter
    }

    pub fn set_counter(&mut self, counter: u8) {
        self.counter = counter % LINE_WIDTH;
    }

    /// Clocks between a RESx strobe and the first pixel
    fn render_delay(&self) -> u8 {
        match self.kind {
            ObjectKind::Player(_) => 5,
            _ => 4,
        }
    }

    /// RESx strobe. In the visible region the object starts drawing a fixed
    /// delay after the strobe; during blank it lands near the left edge.
    pub fn reset_position(&mut self, hblank: bool) {
        let delay = self.render_delay();
        if hblank {
            self.set_position(delay - 2);
        } else {
            self.counter = LINE_WIDTH - delay;
        }
    }

    /// HMxx write
    pub fn set_motion(&mut self, value: u8) {
        self.hmm_clocks = ((value >> 4) ^ 0x08) & 0x0f;
    }

    /// Net leftward shift of one HMOVE, in pixels
    pub fn motion(&self) -> i8 {
        self.hmm_clocks as i8 - 8
    }

    pub fn start_motion(&mut self) {
        if self.is_movable() {
            self.moving = true;
        }
    }

    /// One motion clock from an HMOVE in progress
    pub fn motion_tick(&mut self, motion_clock: u8) {
        if !self.moving {
            return;
        }

        if motion_clock >= self.hmm_clocks {
            self.moving = false;
        } else {
            self.clock();
        }
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pixels drawn across one line starting from the current counter
    fn scan(object: &GraphicsObject) -> Vec<u8> {
        let mut object = *object;
        let mut drawn = Vec::new();
        for x in 0..LINE_WIDTH {
            if object.pixel(x) {
                drawn.push(x);
            }
            object.clock();
        }
        drawn
    }

    fn with_player(f: impl FnOnce(&mut PlayerGraphics)) -> GraphicsObject {
        let mut object = GraphicsObject::player();
        if let ObjectKind::Player(player) = &mut object.kind {
            f(player);
        }
        object
    }

    #[test]
    fn test_power_on_position() {
        let ball = GraphicsObject::ball();
        assert_eq!(ball.position(), 80);
    }

    #[test]
    fn test_player_pattern_and_reflect() {
        let mut player = with_player(|p| p.pattern_new = 0b1100_0001);
        player.set_position(10);
        assert_eq!(scan(&player), vec![10, 11, 17]);

        if let ObjectKind::Player(p) = &mut player.kind {
            p.reflect = true;
        }
        assert_eq!(scan(&player), vec![10, 16, 17]);
    }

    #[test]
    fn test_player_copies_and_scaling() {
        let mut player = with_player(|p| {
            p.pattern_new = 0x80;
            p.nusiz = 3;
        });
        player.set_position(0);
        assert_eq!(scan(&player), vec![0, 16, 32]);

        if let ObjectKind::Player(p) = &mut player.kind {
            p.nusiz = 7;
        }
        assert_eq!(scan(&player), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_player_wraps_around_the_line() {
        let mut player = with_player(|p| p.pattern_new = 0xff);
        player.set_position(156);
        assert_eq!(scan(&player), vec![0, 1, 2, 3, 156, 157, 158, 159]);
    }

    #[test]
    fn test_vdel_selects_old_pattern() {
        let player = with_player(|p| {
            p.pattern_new = 0xff;
            p.pattern_old = 0x00;
            p.vdel = true;
        });
        assert!(scan(&player).is_empty());
    }

    #[test]
    fn test_missile_width() {
        let mut missile = GraphicsObject::missile();
        if let ObjectKind::Missile(m) = &mut missile.kind {
            m.enabled = true;
            m.nusiz = 0x20;
        }
        missile.set_position(40);
        assert_eq!(scan(&missile), vec![40, 41, 42, 43]);
    }

    #[test]
    fn test_playfield_halves() {
        let mut pf = PlayfieldGraphics::default();
        pf.set_pf0(0x10);
        assert!(pf.bit_at(0) && pf.bit_at(3) && !pf.bit_at(4));
        // Repeated right half
        assert!(pf.bit_at(80) && !pf.bit_at(156));

        pf.reflect = true;
        assert!(!pf.bit_at(80) && pf.bit_at(159));

        pf.set_pf0(0);
        pf.set_pf1(0x80);
        assert!(pf.bit_at(16) && !pf.bit_at(20));
        pf.set_pf1(0);
        pf.set_pf2(0x80);
        assert!(pf.bit_at(76) && !pf.bit_at(72));
    }

    #[test]
    fn test_motion_clock_count() {
        let mut ball = GraphicsObject::ball();
        ball.set_motion(0x70);
        assert_eq!(ball.motion(), 7);

        let start = ball.counter();
        ball.start_motion();
        for clock in 0..16 {
            ball.motion_tick(clock);
        }
        assert!(!ball.is_moving());
        assert_eq!(ball.counter(), (start + 15) % LINE_WIDTH);

        ball.set_motion(0x80);
        assert_eq!(ball.motion(), -8);
    }

    #[test]
    fn test_reset_position_delays() {
        let mut player = GraphicsObject::player();
        player.reset_position(true);
        assert_eq!(player.position(), 3);

        let mut ball = GraphicsObject::ball();
        ball.reset_position(true);
        assert_eq!(ball.position(), 2);
    }
}
