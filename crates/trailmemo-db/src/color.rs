use md5::{Digest, Md5};

/// Deterministic display color for a user id, formatted `#rrggbb`.
///
/// Hue spans the full wheel. Saturation stays within 60-80% and lightness
/// within 45-65%.
pub fn derive_color(user_id: &str) -> String {
    let (hue, saturation, lightness) = hsl_for(user_id);
    let (r, g, b) = hsl_to_rgb(hue, saturation, lightness);
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

fn hsl_for(user_id: &str) -> (f64, f64, f64) {
    let digest = Md5::digest(user_id.as_bytes());

    let hue = f64::from(u16::from_be_bytes([digest[0], digest[1]]) % 360);
    let saturation = 60.0 + f64::from(digest[2] % 21);
    let lightness = 45.0 + f64::from(digest[3] % 21);

    (hue, saturation, lightness)
}

/// h in degrees, s and l in percent.
fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let h = h / 360.0;
    let s = s / 100.0;
    let l = l / 100.0;

    if s == 0.0 {
        let v = to_channel(l);
        return (v, v, v);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        to_channel(hue_to_rgb(p, q, h + 1.0 / 3.0)),
        to_channel(hue_to_rgb(p, q, h)),
        to_channel(hue_to_rgb(p, q, h - 1.0 / 3.0)),
    )
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

fn to_channel(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
