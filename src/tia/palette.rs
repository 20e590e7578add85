//! Colour palettes
//!
//! The chip emits 7-bit colour indices (bit 0 is always clear). Each palette
//! maps the 256 possible byte values to RGB: even entries are the colours,
//! odd entries the grey equivalents used for colour loss.
//!
//! Built-in palettes are generated once on first use. A user palette can be
//! installed at runtime from a file; readers never see a half-written one.

use std::fs;
use std::path::Path;
use std::sync::{OnceLock, PoisonError, RwLock};

use log::{info, warn};
use thiserror::Error;

use crate::frame::ConsoleTiming;
use crate::settings::PaletteType;

/// 0x00RRGGBB per byte value
pub type Palette = [u32; 256];

/// 128 NTSC triples, 128 PAL triples and 8 SECAM triples
pub const USER_PALETTE_SIZE: usize = (128 + 128 + 8) * 3;

#[derive(Error, Debug)]
pub enum PaletteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Palette file too short: {0} bytes, expected at least {1}")]
    TooShort(usize, usize),
}

const NTSC_STANDARD: [u32; 128] = [
    0x000000, 0x4a4a4a, 0x6f6f6f, 0x8e8e8e, 0xaaaaaa, 0xc0c0c0, 0xd6d6d6, 0xececec,
    0x484800, 0x69690f, 0x86861d, 0xa2a22a, 0xbbbb35, 0xd2d240, 0xe8e84a, 0xfcfc54,
    0x7c2c00, 0x904811, 0xa26221, 0xb47a30, 0xc3903d, 0xd2a44a, 0xdfb755, 0xecc860,
    0x901c00, 0xa33915, 0xb55328, 0xc66c3a, 0xd5824a, 0xe39759, 0xf0aa67, 0xfcbc74,
    0x940000, 0xa71a1a, 0xb83232, 0xc84848, 0xd65c5c, 0xe46f6f, 0xf08080, 0xfc9090,
    0x840064, 0x97197a, 0xa8308f, 0xb846a2, 0xc659b3, 0xd46cc3, 0xe07cd2, 0xec8ce0,
    0x500084, 0x68199a, 0x7d30ad, 0x9246c0, 0xa459d0, 0xb56ce0, 0xc57cee, 0xd48cfc,
    0x140090, 0x331aa3, 0x4e32b5, 0x6848c6, 0x7f5cd5, 0x956fe3, 0xa980f0, 0xbc90fc,
    0x000094, 0x181aa7, 0x2d32b8, 0x4248c8, 0x545cd6, 0x656fe4, 0x7580f0, 0x8490fc,
    0x001c88, 0x183b9d, 0x2d57b0, 0x4272c2, 0x548ad2, 0x65a0e1, 0x75b5ef, 0x84c8fc,
    0x003064, 0x185080, 0x2d6d98, 0x4288b0, 0x54a0c5, 0x65b7d9, 0x75cceb, 0x84e0fc,
    0x004030, 0x18624e, 0x2d8169, 0x429e82, 0x54b899, 0x65d1ae, 0x75e7c2, 0x84fcd4,
    0x004400, 0x1a661a, 0x328432, 0x48a048, 0x5cba5c, 0x6fd26f, 0x80e880, 0x90fc90,
    0x143c00, 0x355f18, 0x527e2d, 0x6e9c42, 0x87b754, 0x9ed065, 0xb4e775, 0xc8fc84,
    0x303800, 0x505916, 0x6d762b, 0x88923e, 0xa0ab4f, 0xb7c25f, 0xccd86e, 0xe0ec7c,
    0x482c00, 0x694d14, 0x866a26, 0xa28638, 0xbb9f47, 0xd2b656, 0xe8cc63, 0xfce070,
];

const PAL_STANDARD: [u32; 128] = [
    0x000000, 0x121212, 0x242424, 0x484848, 0x6c6c6c, 0x909090, 0xb4b4b4, 0xd8d8d8,
    0x000000, 0x121212, 0x242424, 0x484848, 0x6c6c6c, 0x909090, 0xb4b4b4, 0xd8d8d8,
    0x1d0f00, 0x3f2700, 0x614900, 0x836b01, 0xa58d23, 0xc7af45, 0xe9d167, 0xffe789,
    0x002400, 0x004600, 0x216800, 0x438a07, 0x65ac29, 0x87ce4b, 0xa9f06d, 0xcbff8f,
    0x340000, 0x561400, 0x783602, 0x9a5824, 0xbc7a46, 0xde9c68, 0xffbe8a, 0xffd0ad,
    0x002700, 0x004900, 0x0c6b0c, 0x2e8d2e, 0x50af50, 0x72d172, 0x94f394, 0xb6ffb6,
    0x3d0008, 0x610511, 0x832733, 0xa54955, 0xc76b77, 0xe98d99, 0xffafbb, 0xffd1d7,
    0x001e12, 0x004228, 0x046540, 0x268762, 0x48a984, 0x6acba6, 0x8cedc8, 0xafffe0,
    0x300025, 0x5f0047, 0x811e69, 0xa3408b, 0xc562ad, 0xe784cf, 0xffa8ea, 0xffc9f2,
    0x001431, 0x003653, 0x0a5875, 0x2c7a97, 0x4e9cb9, 0x70bedb, 0x92e0fd, 0xb4ffff,
    0x2c0052, 0x4e0074, 0x701d96, 0x923fb8, 0xb461da, 0xd683fc, 0xe2a5ff, 0xeec9ff,
    0x001759, 0x00247c, 0x1d469e, 0x3f68c0, 0x618ae2, 0x83acff, 0xa5ceff, 0xc7f0ff,
    0x12006d, 0x34038f, 0x5625b1, 0x7847d3, 0x9a69f5, 0xb48cff, 0xc9adff, 0xe1d1ff,
    0x000070, 0x161292, 0x3834b4, 0x5a56d6, 0x7c78f8, 0x9e9aff, 0xc0bcff, 0xe2deff,
    0x000000, 0x121212, 0x242424, 0x484848, 0x6c6c6c, 0x909090, 0xb4b4b4, 0xd8d8d8,
    0x000000, 0x121212, 0x242424, 0x484848, 0x6c6c6c, 0x909090, 0xb4b4b4, 0xd8d8d8,
];

const NTSC_Z26: [u32; 128] = [
    0x000000, 0x505050, 0x646464, 0x787878, 0x8c8c8c, 0xa0a0a0, 0xb4b4b4, 0xc8c8c8,
    0x445400, 0x586800, 0x6c7c00, 0x809000, 0x94a414, 0xa8b828, 0xbccc3c, 0xd0e050,
    0x673900, 0x7b4d00, 0x8f6100, 0xa37513, 0xb78927, 0xcb9d3b, 0xdfb14f, 0xf3c563,
    0x7b2504, 0x8f3918, 0xa34d2c, 0xb76140, 0xcb7554, 0xdf8968, 0xf39d7c, 0xffb190,
    0x7d122c, 0x912640, 0xa53a54, 0xb94e68, 0xcd627c, 0xe17690, 0xf58aa4, 0xff9eb8,
    0x730871, 0x871c85, 0x9b3099, 0xaf44ad, 0xc358c1, 0xd76cd5, 0xeb80e9, 0xff94fd,
    0x5d0b92, 0x711fa6, 0x8533ba, 0x9947ce, 0xad5be2, 0xc16ff6, 0xd583ff, 0xe997ff,
    0x401599, 0x5429ad, 0x683dc1, 0x7c51d5, 0x9065e9, 0xa479fd, 0xb88dff, 0xcca1ff,
    0x252593, 0x3939a7, 0x4d4dbb, 0x6161cf, 0x7575e3, 0x8989f7, 0x9d9dff, 0xb1b1ff,
    0x0f3480, 0x234894, 0x375ca8, 0x4b70bc, 0x5f84d0, 0x7398e4, 0x87acf8, 0x9bc0ff,
    0x04425a, 0x18566e, 0x2c6a82, 0x407e96, 0x5492aa, 0x68a6be, 0x7cbad2, 0x90cee6,
    0x044f30, 0x186344, 0x2c7758, 0x408b6c, 0x549f80, 0x68b394, 0x7cc7a8, 0x90dbbc,
    0x0f550a, 0x23691e, 0x377d32, 0x4b9146, 0x5fa55a, 0x73b96e, 0x87cd82, 0x9be196,
    0x1f5100, 0x336505, 0x477919, 0x5b8d2d, 0x6fa141, 0x83b555, 0x97c969, 0xabdd7d,
    0x344600, 0x485a00, 0x5c6e14, 0x708228, 0x84963c, 0x98aa50, 0xacbe64, 0xc0d278,
    0x463e00, 0x5a5205, 0x6e6619, 0x827a2d, 0x968e41, 0xaaa255, 0xbeb669, 0xd2ca7d,
];

const PAL_Z26: [u32; 128] = [
    0x000000, 0x4c4c4c, 0x606060, 0x747474, 0x888888, 0x9c9c9c, 0xb0b0b0, 0xc4c4c4,
    0x000000, 0x4c4c4c, 0x606060, 0x747474, 0x888888, 0x9c9c9c, 0xb0b0b0, 0xc4c4c4,
    0x533a00, 0x674e00, 0x7b6203, 0x8f7617, 0xa38a2b, 0xb79e3f, 0xcbb253, 0xdfc667,
    0x1b5800, 0x2f6c00, 0x438001, 0x579415, 0x6ba829, 0x7fbc3d, 0x93d051, 0xa7e465,
    0x6a2900, 0x7e3d12, 0x925126, 0xa6653a, 0xba794e, 0xce8d62, 0xe2a176, 0xf6b58a,
    0x075b00, 0x1b6f11, 0x2f8325, 0x439739, 0x57ab4d, 0x6bbf61, 0x7fd375, 0x93e789,
    0x741b2f, 0x882f43, 0x9c4357, 0xb0576b, 0xc46b7f, 0xd87f93, 0xec93a7, 0xffa7bb,
    0x00572e, 0x106b42, 0x247f56, 0x38936a, 0x4ca77e, 0x60bb92, 0x74cfa6, 0x88e3ba,
    0x6d165f, 0x812a73, 0x953e87, 0xa9529b, 0xbd66af, 0xd17ac3, 0xe58ed7, 0xf9a2eb,
    0x014c5e, 0x156072, 0x297486, 0x3d889a, 0x519cae, 0x65b0c2, 0x79c4d6, 0x8dd8ea,
    0x5f1588, 0x73299c, 0x873db0, 0x9b51c4, 0xaf65d8, 0xc379ec, 0xd78dff, 0xeba1ff,
    0x123b87, 0x264f9b, 0x3a63af, 0x4e77c3, 0x628bd7, 0x769feb, 0x8ab3ff, 0x9ec7ff,
    0x451e9d, 0x5932b1, 0x6d46c5, 0x815ad9, 0x956eed, 0xa982ff, 0xbd96ff, 0xd1aaff,
    0x2a2b9e, 0x3e3fb2, 0x5253c6, 0x6667da, 0x7a7bee, 0x8e8fff, 0xa2a3ff, 0xb6b7ff,
    0x000000, 0x4c4c4c, 0x606060, 0x747474, 0x888888, 0x9c9c9c, 0xb0b0b0, 0xc4c4c4,
    0x000000, 0x4c4c4c, 0x606060, 0x747474, 0x888888, 0x9c9c9c, 0xb0b0b0, 0xc4c4c4,
];

const SECAM_STANDARD: [u32; 8] = [
    0x000000, 0x2121ff, 0xf03c79, 0xff50ff, 0x7fff00, 0x7fffff, 0xffff3f, 0xffffff,
];

const SECAM_Z26: [u32; 8] = [
    0x000000, 0x2121ff, 0xf03c79, 0xff3cff, 0x7fff00, 0x7fffff, 0xffff3f, 0xffffff,
];

#[derive(Clone)]
struct PaletteSet {
    ntsc: Palette,
    pal: Palette,
    secam: Palette,
}

impl PaletteSet {
    fn from_colors(ntsc: &[u32; 128], pal: &[u32; 128], secam: &[u32; 8]) -> Self {
        PaletteSet {
            ntsc: expand(|color| ntsc[color]),
            pal: expand(|color| pal[color]),
            secam: expand(|color| secam[color & 0x07]),
        }
    }

    fn get(&self, timing: ConsoleTiming) -> &Palette {
        match timing {
            ConsoleTiming::Ntsc => &self.ntsc,
            ConsoleTiming::Pal => &self.pal,
            ConsoleTiming::Secam => &self.secam,
        }
    }
}

struct BuiltinPalettes {
    standard: PaletteSet,
    z26: PaletteSet,
}

static BUILTIN: OnceLock<BuiltinPalettes> = OnceLock::new();

static USER: RwLock<Option<PaletteSet>> = RwLock::new(None);

fn builtin() -> &'static BuiltinPalettes {
    BUILTIN.get_or_init(|| BuiltinPalettes {
        standard: PaletteSet::from_colors(&NTSC_STANDARD, &PAL_STANDARD, &SECAM_STANDARD),
        z26: PaletteSet::from_colors(&NTSC_Z26, &PAL_Z26, &SECAM_Z26),
    })
}

/// Luminance of an RGB colour as a grey RGB value
pub fn grey(rgb: u32) -> u32 {
    let r = ((rgb >> 16) & 0xff) as f64;
    let g = ((rgb >> 8) & 0xff) as f64;
    let b = (rgb & 0xff) as f64;
    let y = (r * 0.2989 + g * 0.5870 + b * 0.1140) as u32;
    (y << 16) | (y << 8) | y
}

/// Build a 256 entry palette from a colour number lookup
fn expand(color: impl Fn(usize) -> u32) -> Palette {
    let mut palette = [0; 256];
    for (index, entry) in palette.iter_mut().enumerate() {
        let rgb = color(index >> 1);
        *entry = if index & 1 == 0 { rgb } else { grey(rgb) };
    }
    palette
}

fn read_triples<const N: usize>(data: &[u8]) -> [u32; N] {
    let mut colors = [0; N];
    for (color, rgb) in colors.iter_mut().zip(data.chunks_exact(3)) {
        *color = ((rgb[0] as u32) << 16) | ((rgb[1] as u32) << 8) | rgb[2] as u32;
    }
    colors
}

/// Install a user palette from raw file contents
///
/// Extra bytes past the SECAM block are ignored. On error the previously
/// installed user palette (if any) is kept.
pub fn load_user_palette_bytes(data: &[u8]) -> Result<(), PaletteError> {
    if data.len() < USER_PALETTE_SIZE {
        return Err(PaletteError::TooShort(data.len(), USER_PALETTE_SIZE));
    }

    let ntsc: [u32; 128] = read_triples(&data[..384]);
    let pal: [u32; 128] = read_triples(&data[384..768]);
    let secam: [u32; 8] = read_triples(&data[768..USER_PALETTE_SIZE]);

    let set = PaletteSet::from_colors(&ntsc, &pal, &secam);
    *USER.write().unwrap_or_else(PoisonError::into_inner) = Some(set);
    Ok(())
}

/// Install a user palette from a file
pub fn load_user_palette<P: AsRef<Path>>(path: P) -> Result<(), PaletteError> {
    let data = fs::read(path.as_ref())?;
    load_user_palette_bytes(&data)?;
    info!("User palette loaded from {}", path.as_ref().display());
    Ok(())
}

/// Remove the user palette
pub fn clear_user_palette() {
    *USER.write().unwrap_or_else(PoisonError::into_inner) = None;
}

pub fn has_user_palette() -> bool {
    USER.read().unwrap_or_else(PoisonError::into_inner).is_some()
}

/// Palette for a console timing and variant
///
/// Asking for the user palette when none is installed yields the standard
/// palette.
pub fn palette(timing: ConsoleTiming, variant: PaletteType) -> Palette {
    match variant {
        PaletteType::Standard => *builtin().standard.get(timing),
        PaletteType::Z26 => *builtin().z26.get(timing),
        PaletteType::User => {
            let user = USER.read().unwrap_or_else(PoisonError::into_inner);
            match user.as_ref() {
                Some(set) => *set.get(timing),
                None => {
                    warn!("No user palette installed, using standard palette");
                    *builtin().standard.get(timing)
                }
            }
        }
    }
}

/// RGB value of a single colour index
pub fn rgb(timing: ConsoleTiming, variant: PaletteType, index: u8) -> u32 {
    match variant {
        PaletteType::Standard => builtin().standard.get(timing)[index as usize],
        PaletteType::Z26 => builtin().z26.get(timing)[index as usize],
        PaletteType::User => palette(timing, variant)[index as usize],
    }
}
