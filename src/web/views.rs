use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;

use super::AppState;
use crate::prompt::Vibe;

#[derive(Clone, Debug)]
pub(crate) struct VibeOption {
    pub(crate) value: String,
    pub(crate) title: &'static str,
    pub(crate) description: &'static str,
}

impl From<Vibe> for VibeOption {
    fn from(vibe: Vibe) -> Self {
        let (title, description) = match vibe {
            Vibe::Party => (
                "Party '95",
                "Christmas party vibes, flash photography, festive atmosphere.",
            ),
            Vibe::Home => (
                "Home '95",
                "Cozy living room, tree lights, family album feeling.",
            ),
            Vibe::Couple => (
                "Couple '95",
                "Two of you under the mistletoe, first christmas together.",
            ),
        };
        Self {
            value: vibe.to_string(),
            title,
            description,
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub(crate) struct IndexTemplate {
    pub(crate) vibes: Vec<VibeOption>,
    pub(crate) max_image_mb: usize,
}

/// handles the / GET
pub(crate) async fn index_handler(State(state): State<AppState>) -> IndexTemplate {
    IndexTemplate {
        vibes: [Vibe::Party, Vibe::Home, Vibe::Couple]
            .into_iter()
            .map(VibeOption::from)
            .collect(),
        max_image_mb: state.max_image_bytes / (1024 * 1024),
    }
}
