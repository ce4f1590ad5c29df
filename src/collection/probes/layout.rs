//! Probes that measure elements inserted into the page.

use async_trait::async_trait;

use crate::collection::core::{ProbeFault, Reading, keys};
use crate::environment::{BrowserEnvironment, ElementSpec, ScopedElement};

use super::{ImmediateProbe, SuspendingProbe};

/// Bounding box of a large monospace string rendered off-screen.
#[derive(Debug, Clone)]
pub struct ClientRectsProbe {
    text: String,
}

impl Default for ClientRectsProbe {
    fn default() -> Self {
        Self {
            text: "mwmwmwmwlliilliil".into(),
        }
    }
}

impl ClientRectsProbe {
    fn element(&self) -> ElementSpec {
        ElementSpec::div()
            .off_screen()
            .with_style("font-size", "72px")
            .with_style("font-family", "monospace")
            .with_text(self.text.clone())
    }
}

impl ImmediateProbe for ClientRectsProbe {
    fn name(&self) -> &'static str {
        keys::noise::CLIENT_RECTS
    }

    fn key(&self) -> &'static str {
        keys::CLIENT_RECTS
    }

    fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        ScopedElement::create(env, &self.element(), None)
            .and_then(|element| element.measure())
            .map(|rect| format!("{}x{}", rect.width, rect.height))
            .into()
    }
}

/// Detects extensions that rewrite page colors.
///
/// An element is painted with a sentinel background; one frame later its
/// computed color should be unchanged.
#[derive(Debug, Clone)]
pub struct ThemeChangerProbe {
    sentinel: String,
}

impl Default for ThemeChangerProbe {
    fn default() -> Self {
        Self {
            sentinel: "rgb(1, 2, 3)".into(),
        }
    }
}

#[async_trait]
impl SuspendingProbe for ThemeChangerProbe {
    fn name(&self) -> &'static str {
        keys::THEME_CHANGER
    }

    fn key(&self) -> &'static str {
        keys::THEME_CHANGER
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        let spec = ElementSpec::div()
            .off_screen()
            .with_style("background-color", self.sentinel.clone());
        let element = match ScopedElement::create(env, &spec, None) {
            Ok(element) => element,
            Err(fault) => return Reading::fault(fault),
        };

        env.next_frame().await;

        let computed = match element.measure() {
            Ok(rect) => rect.background_color,
            Err(fault) => return Reading::fault(fault),
        };
        drop(element);

        if computed.is_empty() {
            return Reading::fault(ProbeFault::Empty);
        }
        Reading::value(computed != self.sentinel)
    }
}
