/// Frequency of middle C (C4), the reference note for all pitch ratios.
pub const BASE_FREQUENCY: f32 = 261.63;

/// The twelve chromatic note names, one octave starting at middle C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Note {
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

impl Note {
    pub const ALL: [Note; 12] = [
        Note::C,
        Note::Cs,
        Note::D,
        Note::Ds,
        Note::E,
        Note::F,
        Note::Fs,
        Note::G,
        Note::Gs,
        Note::A,
        Note::As,
        Note::B,
    ];

    /// Reference frequency in Hz, equal temperament around A4 = 440 Hz.
    /// These are the shipped 2-decimal constants, not recomputed from
    /// semitone exponents, so ratios reproduce them exactly.
    pub fn frequency(self) -> f32 {
        match self {
            Note::C => 261.63,
            Note::Cs => 277.18,
            Note::D => 293.66,
            Note::Ds => 311.13,
            Note::E => 329.63,
            Note::F => 349.23,
            Note::Fs => 369.99,
            Note::G => 392.00,
            Note::Gs => 415.30,
            Note::A => 440.00,
            Note::As => 466.16,
            Note::B => 493.88,
        }
    }

    /// Playback-rate multiplier that makes the base sample sound at this
    /// note: `frequency / frequency(C)`.
    pub fn pitch_ratio(self) -> f32 {
        self.frequency() / BASE_FREQUENCY
    }

    pub fn name(self) -> &'static str {
        match self {
            Note::C => "C",
            Note::Cs => "C#",
            Note::D => "D",
            Note::Ds => "D#",
            Note::E => "E",
            Note::F => "F",
            Note::Fs => "F#",
            Note::G => "G",
            Note::Gs => "G#",
            Note::A => "A",
            Note::As => "A#",
            Note::B => "B",
        }
    }
}

impl std::fmt::Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_frequency_over_c() {
        for note in Note::ALL {
            assert_eq!(note.pitch_ratio(), note.frequency() / BASE_FREQUENCY);
        }
        assert_eq!(Note::C.pitch_ratio(), 1.0);
    }

    #[test]
    fn a_is_the_expected_ratio() {
        let a = Note::A.pitch_ratio();
        assert!((a - 440.0 / 261.63).abs() < 1e-6);
        assert!((a - 1.6818).abs() < 1e-4);
    }

    #[test]
    fn ratios_strictly_increase_up_the_chromatic_scale() {
        for pair in Note::ALL.windows(2) {
            assert!(
                pair[0].pitch_ratio() < pair[1].pitch_ratio(),
                "{} should be below {}",
                pair[0],
                pair[1]
            );
        }
        assert!(Note::ALL.iter().all(|n| n.pitch_ratio() > 0.0));
    }
}
