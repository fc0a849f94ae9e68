//! The per-segment synthesis request record handed in by the host layer.

use serde::{Deserialize, Serialize};

/// Everything the engine needs to reshape one recorded segment.
///
/// Field meanings and value ranges follow the classic resampler call
/// convention; hosts that received missing or unparsable values are expected
/// to fall back to [`SynthRequest::default`] per field rather than fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthRequest {
    /// Sample rate of `samples`, in Hz.
    pub sample_fs: i32,
    /// The recorded segment, mono.
    pub samples: Vec<f64>,
    /// Raw bytes of a pre-computed pitch curve ([`crate::frq`]); empty when
    /// the pitch should be tracked from `samples` instead.
    pub frq: Vec<u8>,
    /// Target tone as a MIDI-like note number (A4 = 69).
    pub tone: i32,
    /// Consonant velocity in percent; 100 leaves the consonant unstretched.
    pub con_vel: f64,
    /// Start of the input region, ms from the beginning of the sample.
    pub offset: f64,
    /// Requested output length in ms.
    pub required_length: f64,
    /// Length of the fixed-rate consonant part, ms.
    pub consonant: f64,
    /// End of the input region, ms from the end of the sample; a negative
    /// value is an explicit vowel-length override.
    pub cut_off: f64,
    /// Output volume in percent.
    pub volume: f64,
    /// Modulation in percent. Carried for the host; unused by the core math.
    pub modulation: f64,
    /// Tempo of the pitch-bend curve, in BPM.
    pub tempo: f64,
    /// Pitch-bend curve in centicents, one sample per 5 ticks at 480 ticks
    /// per quarter note.
    pub pitch_bend: Vec<i32>,
    /// Gender/formant-shift flag, [-100, 100].
    pub flag_gender: i32,
    /// Legacy formant flag. Carried for the host; unused by the core math.
    pub flag_formant: i32,
    /// Peak-compression flag, [0, 100].
    pub flag_peak_compression: i32,
    /// Tension flag, [-100, 100].
    pub flag_tension: i32,
    /// Breathiness flag, [-100, 100].
    pub flag_breathiness: i32,
    /// Voicing flag, [0, 100].
    pub flag_voicing: i32,
}

impl Default for SynthRequest {
    fn default() -> Self {
        Self {
            sample_fs: 44100,
            samples: Vec::new(),
            frq: Vec::new(),
            tone: 40,
            con_vel: 100.0,
            offset: 0.0,
            required_length: 0.0,
            consonant: 0.0,
            cut_off: 0.0,
            volume: 100.0,
            modulation: 100.0,
            tempo: 120.0,
            pitch_bend: Vec::new(),
            flag_gender: 0,
            flag_formant: 0,
            flag_peak_compression: 86,
            flag_tension: 0,
            flag_breathiness: 0,
            flag_voicing: 100,
        }
    }
}

impl SynthRequest {
    /// Populate the flag fields from the textual flag string (`g-30P86Mt20`).
    ///
    /// Each letter code is followed by an optional numeral; a `-` is only
    /// consumed as the very first scanned character. Unparsable or absent
    /// numerals fall back to the flag's default, results are clamped to the
    /// declared range.
    pub fn apply_flags(&mut self, flags: &str) {
        self.flag_gender = parse_flag(flags, "g", 0).clamp(-100, 100);
        self.flag_formant = parse_flag(flags, "O", 0);
        self.flag_peak_compression = parse_flag(flags, "P", 86).clamp(0, 100);
        self.flag_tension = parse_flag(flags, "Mt", 0).clamp(-100, 100);
        self.flag_breathiness = parse_flag(flags, "Mb", 0).clamp(-100, 100);
        self.flag_voicing = parse_flag(flags, "Mv", 100).clamp(0, 100);
    }
}

fn parse_flag(flags: &str, code: &str, default: i32) -> i32 {
    let Some(index) = flags.find(code) else {
        return default;
    };
    let rest = &flags[index + code.len()..];
    let mut end = 0;
    for (i, c) in rest.char_indices() {
        if (c == '-' && i == 0) || c.is_ascii_digit() {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    rest[..end].parse().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::SynthRequest;

    fn flags(s: &str) -> SynthRequest {
        let mut request = SynthRequest::default();
        request.apply_flags(s);
        request
    }

    #[test]
    fn defaults_without_flag_string() {
        let request = flags("");
        assert_eq!(request.flag_gender, 0);
        assert_eq!(request.flag_peak_compression, 86);
        assert_eq!(request.flag_voicing, 100);
    }

    #[test]
    fn parses_values_and_clamps() {
        let request = flags("g-30P120Mt40Mb-10Mv80");
        assert_eq!(request.flag_gender, -30);
        assert_eq!(request.flag_peak_compression, 100);
        assert_eq!(request.flag_tension, 40);
        assert_eq!(request.flag_breathiness, -10);
        assert_eq!(request.flag_voicing, 80);
    }

    #[test]
    fn code_without_numeral_falls_back() {
        let request = flags("PMt20");
        assert_eq!(request.flag_peak_compression, 86);
        assert_eq!(request.flag_tension, 20);
    }

    #[test]
    fn minus_only_consumed_as_first_character() {
        // The second '-' stops the scan; "5" is the parsed numeral.
        let request = flags("g5-5");
        assert_eq!(request.flag_gender, 5);
        // A bare '-' is not a numeral.
        let request = flags("g--5");
        assert_eq!(request.flag_gender, 0);
    }
}
