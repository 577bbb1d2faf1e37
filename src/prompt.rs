//! Scene variants and the parameter bag sent to the image model.

use std::str::FromStr;

use crate::job::JobInput;

/// Keeps the subject recognisable.
const IDENTITY: &str = "the same person as in the input photo, same face shape, eyes, nose, \
    lips, jawline, skin tone, age and proportions, instantly recognisable";

/// Stops the model restyling hair.
const HAIR: &str = "identical hairstyle, hair length, hair colour and parting as the input, \
    no new bangs, hats or accessories";

/// Shared look for every scene.
const FILM_LOOK: &str = "genuine mid-1990s instant photo, soft focus, fine film grain, warm \
    tungsten cast, light corner vignette, slightly blown highlights, direct on-camera flash, \
    darker background, candid handheld snapshot";

/// Things every scene avoids.
const NEGATIVE_PROMPT: &str = "cartoon, illustration, anime, 3d render, painting, cgi, plastic \
    skin, heavy retouching, glitch, jpeg artifacts, deformed face, distorted eyes, extra limbs, \
    extra fingers, duplicated person, merged faces, changed gender, large age change, different \
    hair colour, different hair length, sunglasses, extra people with visible faces";

/// The scene a photo gets restaged into.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Vibe {
    /// Office christmas party, 1995.
    Party,
    /// Family living room at christmas, 1995.
    Home,
    /// Two people together under the tree, 1995.
    Couple,
}

/// An unrecognised vibe name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVibe(pub String);

impl std::fmt::Display for UnknownVibe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown vibe mode: {:?}", self.0)
    }
}

impl std::error::Error for UnknownVibe {}

impl FromStr for Vibe {
    type Err = UnknownVibe;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "party" => Ok(Self::Party),
            "home" => Ok(Self::Home),
            "couple" => Ok(Self::Couple),
            _ => Err(UnknownVibe(value.to_string())),
        }
    }
}

impl std::fmt::Display for Vibe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Party => "party",
            Self::Home => "home",
            Self::Couple => "couple",
        })
    }
}

impl Vibe {
    fn scene(self) -> &'static str {
        match self {
            Self::Party => {
                "one person only, chest-up and centred, 1995 office christmas party, blurred \
                 coworkers and tinsel behind, red plastic cups, fluorescent light mixed with \
                 string lights, festive knit sweater, caught mid-laugh"
            }
            Self::Home => {
                "one person only, 1995 family living room at christmas, decorated tree with \
                 coloured lights behind, wrapped presents, patterned carpet, wood panelling, \
                 crt television, oversized sweater, relaxed warm smile"
            }
            Self::Couple => {
                "exactly two people, keep both original faces, no third person, no duplicated \
                 or merged faces, sitting close and leaning together, chest-up, 1995 christmas, \
                 bokeh tree lights behind, mistletoe above, soft affectionate smiles"
            }
        }
    }

    /// Full prompt text for this vibe.
    pub fn prompt(self) -> String {
        format!("{IDENTITY}, {HAIR}, {}, {FILM_LOOK}", self.scene())
    }
}

impl JobInput {
    /// The parameter bag for restaging `image` into `vibe`.
    pub fn for_vibe(vibe: Vibe, image: &str) -> Self {
        JobInput::default()
            .set("prompt", vibe.prompt())
            .set("negative_prompt", NEGATIVE_PROMPT)
            .set("image", image)
            .set("go_fast", true)
            .set("guidance_scale", 3.5)
            .set("megapixels", "1")
            .set("num_inference_steps", 30)
            .set("prompt_strength", 0.5)
            .set("output_format", "jpg")
            .set("output_quality", 92)
            .set("aspect_ratio", "4:5")
    }
}
