//! The fixed hairstyle menu.
//!
//! Each style carries three faces: the button label shown in the chat, a
//! stable callback token that round-trips through the transport, and the
//! prompt fragment handed to the image-generation service.

/// One of the hairstyles the bot can try on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hairstyle {
    LongCurly,
    BobCut,
    ShortPixie,
    LongStraight,
    RainbowColored,
}

impl Hairstyle {
    /// Menu order, one button per row.
    pub const ALL: [Hairstyle; 5] = [
        Hairstyle::LongCurly,
        Hairstyle::BobCut,
        Hairstyle::ShortPixie,
        Hairstyle::LongStraight,
        Hairstyle::RainbowColored,
    ];

    /// Button label shown to the user.
    pub fn label(self) -> &'static str {
        match self {
            Hairstyle::LongCurly => "Curly 💇‍♀️",
            Hairstyle::BobCut => "Bob cut 👩‍🦰",
            Hairstyle::ShortPixie => "Pixie cut 💇‍♂️",
            Hairstyle::LongStraight => "Long straight 👱‍♀️",
            Hairstyle::RainbowColored => "Rainbow colors 🌈",
        }
    }

    /// Stable token used as inline-keyboard callback data.
    pub fn token(self) -> &'static str {
        match self {
            Hairstyle::LongCurly => "long_curly",
            Hairstyle::BobCut => "bob_cut",
            Hairstyle::ShortPixie => "short_pixie",
            Hairstyle::LongStraight => "long_straight",
            Hairstyle::RainbowColored => "rainbow",
        }
    }

    /// Fragment spliced into the generation prompt.
    pub fn prompt(self) -> &'static str {
        match self {
            Hairstyle::LongCurly => "long curly hair",
            Hairstyle::BobCut => "bob cut",
            Hairstyle::ShortPixie => "short pixie cut",
            Hairstyle::LongStraight => "long straight hair",
            Hairstyle::RainbowColored => "rainbow colored hair",
        }
    }

    /// Parse a callback token back into a style.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.token() == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip() {
        for style in Hairstyle::ALL {
            assert_eq!(Hairstyle::from_token(style.token()), Some(style));
        }
    }

    #[test]
    fn unknown_token_rejected() {
        assert_eq!(Hairstyle::from_token("mullet"), None);
    }

    #[test]
    fn menu_has_five_distinct_entries() {
        let mut tokens: Vec<_> = Hairstyle::ALL.iter().map(|s| s.token()).collect();
        tokens.sort_unstable();
        tokens.dedup();
        assert_eq!(tokens.len(), 5);
    }
}
