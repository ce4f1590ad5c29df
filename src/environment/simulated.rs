//! Deterministic in-process browser used by tests and demos.
//!
//! Every asynchronous capability is a [`SimulatedApi`] with a latency and a
//! scripted result (or a hang). The DOM is a flat node table with a toy layout
//! model. Two kinds of client interference can be switched on:
//! anti-fingerprinting noise ([`NoiseTarget`]) that perturbs repeated reads,
//! and a cosmetic-filter [`ContentBlocker`] that hides matching elements.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tokio::time::sleep;

use super::{
    AdapterInfo, BatteryStatus, BrowserEnvironment, CanvasScene, ConnectionInfo, ElementBox,
    ElementSpec, GpuAdapter, MediaDeviceKind, NavigatorInfo, NodeId, OscillatorSpec, ScreenInfo,
    SceneSpec, ScopedElement,
};
use crate::collection::core::ProbeFault;

/// What a simulated call does once its latency elapsed.
#[derive(Debug, Clone)]
pub enum ApiBehavior<T> {
    Resolve(Result<T, ProbeFault>),
    /// Never settles.
    Hang,
}

/// Scripted asynchronous capability.
#[derive(Debug, Clone)]
pub struct SimulatedApi<T> {
    pub latency: Duration,
    pub behavior: ApiBehavior<T>,
}

impl<T: Clone> SimulatedApi<T> {
    pub fn ready(value: T) -> Self {
        Self::delayed(value, Duration::ZERO)
    }

    pub fn delayed(value: T, latency: Duration) -> Self {
        Self {
            latency,
            behavior: ApiBehavior::Resolve(Ok(value)),
        }
    }

    pub fn failing(fault: ProbeFault) -> Self {
        Self {
            latency: Duration::ZERO,
            behavior: ApiBehavior::Resolve(Err(fault)),
        }
    }

    pub fn hanging() -> Self {
        Self {
            latency: Duration::ZERO,
            behavior: ApiBehavior::Hang,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn call(&self) -> Result<T, ProbeFault> {
        if self.latency > Duration::ZERO {
            sleep(self.latency).await;
        } else {
            tokio::task::yield_now().await;
        }
        match &self.behavior {
            ApiBehavior::Resolve(result) => result.clone(),
            ApiBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Signals an anti-fingerprinting extension perturbs on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoiseTarget {
    Canvas,
    Audio,
    ClientRects,
}

/// Cosmetic filter engine hiding every element matched by one of its selectors.
#[derive(Debug, Clone, Default)]
pub struct ContentBlocker {
    selectors: Vec<String>,
}

impl ContentBlocker {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn hides(&self, spec: &ElementSpec) -> bool {
        let markup = render_markup(spec);
        let fragment = Html::parse_fragment(&markup);
        self.selectors.iter().any(|raw| match Selector::parse(raw) {
            Ok(selector) => fragment.select(&selector).next().is_some(),
            Err(_) => false,
        })
    }
}

fn render_markup(spec: &ElementSpec) -> String {
    let mut markup = format!("<{}", spec.tag);
    if let Some(id) = &spec.id {
        markup.push_str(&format!(
            " id=\"{}\"",
            html_escape::encode_double_quoted_attribute(id)
        ));
    }
    if !spec.classes.is_empty() {
        markup.push_str(&format!(
            " class=\"{}\"",
            html_escape::encode_double_quoted_attribute(&spec.classes.join(" "))
        ));
    }
    for (name, value) in &spec.attributes {
        markup.push_str(&format!(
            " {}=\"{}\"",
            name,
            html_escape::encode_double_quoted_attribute(value)
        ));
    }
    markup.push('>');
    if let Some(text) = &spec.text {
        markup.push_str(&html_escape::encode_text(text));
    }
    markup.push_str(&format!("</{}>", spec.tag));
    markup
}

#[derive(Debug, Clone)]
struct SimNode {
    spec: ElementSpec,
    parent: Option<NodeId>,
}

#[derive(Debug, Default)]
struct Dom {
    next_id: NodeId,
    nodes: HashMap<NodeId, SimNode>,
}

impl Dom {
    fn insert(&mut self, spec: ElementSpec, parent: Option<NodeId>) -> NodeId {
        self.next_id += 1;
        let id = self.next_id;
        self.nodes.insert(id, SimNode { spec, parent });
        id
    }

    fn remove_subtree(&mut self, root: NodeId) -> bool {
        if self.nodes.remove(&root).is_none() {
            return false;
        }
        let children: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent == Some(root))
            .map(|(id, _)| *id)
            .collect();
        for child in children {
            self.remove_subtree(child);
        }
        true
    }
}

/// Scriptable browser double.
#[derive(Debug)]
pub struct SimulatedEnvironment {
    navigator: NavigatorInfo,
    screen: Option<ScreenInfo>,
    time_zone: Option<String>,
    timezone_offset: i32,
    connection: Option<ConnectionInfo>,
    webgl_renderer: Result<Option<String>, ProbeFault>,
    canvas: SimulatedApi<()>,
    audio: SimulatedApi<()>,
    geolocation: SimulatedApi<()>,
    battery: SimulatedApi<BatteryStatus>,
    media_devices: SimulatedApi<Vec<MediaDeviceKind>>,
    speech_voices: Result<usize, ProbeFault>,
    script_load: SimulatedApi<()>,
    scene_pixel: Result<[u8; 4], ProbeFault>,
    gpu_adapter: SimulatedApi<Option<GpuAdapter>>,
    gpu_info: SimulatedApi<Option<AdapterInfo>>,
    theme_override: Option<String>,
    blocker: Option<ContentBlocker>,
    noise: HashSet<NoiseTarget>,
    reads: AtomicU64,
    dom: Mutex<Dom>,
}

impl Default for SimulatedEnvironment {
    fn default() -> Self {
        Self::desktop_chrome()
    }
}

impl SimulatedEnvironment {
    /// A typical Windows desktop running Chrome with every API available.
    pub fn desktop_chrome() -> Self {
        Self {
            navigator: NavigatorInfo {
                user_agent: Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into()),
                language: Some("en-US".into()),
                languages: Some(vec!["en-US".into(), "en".into()]),
                cookie_enabled: true,
                hardware_concurrency: Some(8),
                max_touch_points: Some(0),
                device_memory_gb: Some(8.0),
                bluetooth: true,
                do_not_track: None,
                webdriver: Some(false),
            },
            screen: Some(ScreenInfo {
                width: 1920,
                height: 1080,
                avail_width: 1920,
                avail_height: 1040,
                color_depth: 24,
            }),
            time_zone: Some("America/New_York".into()),
            timezone_offset: 300,
            connection: Some(ConnectionInfo {
                effective_type: Some("4g".into()),
                downlink_mbps: Some(10.0),
                rtt_ms: Some(50),
            }),
            webgl_renderer: Ok(Some(
                "ANGLE (NVIDIA GeForce RTX 3080 Direct3D11 vs_5_0 ps_5_0)".into(),
            )),
            canvas: SimulatedApi::ready(()),
            audio: SimulatedApi::delayed((), Duration::from_millis(2)),
            geolocation: SimulatedApi::delayed((), Duration::from_millis(20))
                .with_behavior(ApiBehavior::Resolve(Err(ProbeFault::PermissionDenied))),
            battery: SimulatedApi::ready(BatteryStatus { charging: true }),
            media_devices: SimulatedApi::ready(vec![
                MediaDeviceKind::AudioInput,
                MediaDeviceKind::AudioOutput,
                MediaDeviceKind::AudioOutput,
                MediaDeviceKind::VideoInput,
            ]),
            speech_voices: Ok(19),
            script_load: SimulatedApi::delayed((), Duration::from_millis(10)),
            scene_pixel: Ok([255, 68, 34, 255]),
            gpu_adapter: SimulatedApi::ready(Some(GpuAdapter { supports_info: true })),
            gpu_info: SimulatedApi::ready(Some(AdapterInfo {
                vendor: "nvidia".into(),
                architecture: "ampere".into(),
                device: String::new(),
                description: String::new(),
            })),
            theme_override: None,
            blocker: None,
            noise: HashSet::new(),
            reads: AtomicU64::new(0),
            dom: Mutex::new(Dom::default()),
        }
    }

    pub fn with_navigator(mut self, edit: impl FnOnce(&mut NavigatorInfo)) -> Self {
        edit(&mut self.navigator);
        self
    }

    pub fn with_screen(mut self, screen: Option<ScreenInfo>) -> Self {
        self.screen = screen;
        self
    }

    pub fn with_time_zone(mut self, time_zone: Option<&str>, offset_minutes: i32) -> Self {
        self.time_zone = time_zone.map(str::to_string);
        self.timezone_offset = offset_minutes;
        self
    }

    pub fn with_connection(mut self, connection: Option<ConnectionInfo>) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_webgl_renderer(mut self, renderer: Result<Option<String>, ProbeFault>) -> Self {
        self.webgl_renderer = renderer;
        self
    }

    pub fn with_canvas(mut self, api: SimulatedApi<()>) -> Self {
        self.canvas = api;
        self
    }

    pub fn with_audio(mut self, api: SimulatedApi<()>) -> Self {
        self.audio = api;
        self
    }

    pub fn with_geolocation(mut self, api: SimulatedApi<()>) -> Self {
        self.geolocation = api;
        self
    }

    pub fn with_battery(mut self, api: SimulatedApi<BatteryStatus>) -> Self {
        self.battery = api;
        self
    }

    pub fn with_media_devices(mut self, api: SimulatedApi<Vec<MediaDeviceKind>>) -> Self {
        self.media_devices = api;
        self
    }

    pub fn with_speech_voices(mut self, voices: Result<usize, ProbeFault>) -> Self {
        self.speech_voices = voices;
        self
    }

    pub fn with_script_load(mut self, api: SimulatedApi<()>) -> Self {
        self.script_load = api;
        self
    }

    pub fn with_scene_pixel(mut self, pixel: Result<[u8; 4], ProbeFault>) -> Self {
        self.scene_pixel = pixel;
        self
    }

    pub fn with_gpu_adapter(mut self, api: SimulatedApi<Option<GpuAdapter>>) -> Self {
        self.gpu_adapter = api;
        self
    }

    pub fn with_gpu_info(mut self, api: SimulatedApi<Option<AdapterInfo>>) -> Self {
        self.gpu_info = api;
        self
    }

    /// Simulate a theme extension repainting every background.
    pub fn with_theme_override(mut self, color: impl Into<String>) -> Self {
        self.theme_override = Some(color.into());
        self
    }

    pub fn with_content_blocker(mut self, blocker: ContentBlocker) -> Self {
        self.blocker = Some(blocker);
        self
    }

    pub fn with_noise(mut self, target: NoiseTarget) -> Self {
        self.noise.insert(target);
        self
    }

    /// Number of elements currently attached to the page.
    pub fn attached_elements(&self) -> usize {
        self.dom.lock().map(|dom| dom.nodes.len()).unwrap_or(0)
    }

    fn perturbation(&self, target: NoiseTarget) -> u64 {
        if self.noise.contains(&target) {
            self.reads.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            0
        }
    }

    fn with_dom<R>(&self, f: impl FnOnce(&mut Dom) -> R) -> Result<R, ProbeFault> {
        let mut guard = self
            .dom
            .lock()
            .map_err(|_| ProbeFault::failed("dom lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

impl<T> SimulatedApi<T> {
    pub fn with_behavior(mut self, behavior: ApiBehavior<T>) -> Self {
        self.behavior = behavior;
        self
    }
}

fn font_size_px(spec: &ElementSpec) -> f64 {
    spec.style("font-size")
        .and_then(|value| value.trim_end_matches("px").parse::<f64>().ok())
        .unwrap_or(16.0)
}

#[async_trait]
impl BrowserEnvironment for SimulatedEnvironment {
    fn navigator(&self) -> NavigatorInfo {
        self.navigator.clone()
    }

    fn screen(&self) -> Result<ScreenInfo, ProbeFault> {
        self.screen.ok_or(ProbeFault::Unsupported)
    }

    fn time_zone(&self) -> Result<String, ProbeFault> {
        self.time_zone.clone().ok_or(ProbeFault::Unsupported)
    }

    fn timezone_offset_minutes(&self) -> i32 {
        self.timezone_offset
    }

    fn connection(&self) -> Option<ConnectionInfo> {
        self.connection.clone()
    }

    fn webgl_unmasked_renderer(&self) -> Result<Option<String>, ProbeFault> {
        self.webgl_renderer.clone()
    }

    fn create_element(
        &self,
        spec: &ElementSpec,
        parent: Option<NodeId>,
    ) -> Result<NodeId, ProbeFault> {
        self.with_dom(|dom| {
            if let Some(parent) = parent
                && !dom.nodes.contains_key(&parent)
            {
                return Err(ProbeFault::failed(format!("parent node {parent} is not attached")));
            }
            Ok(dom.insert(spec.clone(), parent))
        })?
    }

    fn measure(&self, node: NodeId) -> Result<ElementBox, ProbeFault> {
        let spec = self.with_dom(|dom| dom.nodes.get(&node).map(|n| n.spec.clone()))?;
        let spec = spec.ok_or_else(|| ProbeFault::failed(format!("node {node} is not attached")))?;

        let background_color = self
            .theme_override
            .clone()
            .or_else(|| spec.style("background-color").map(str::to_string))
            .unwrap_or_else(|| "rgba(0, 0, 0, 0)".into());

        if self.blocker.as_ref().is_some_and(|blocker| blocker.hides(&spec)) {
            return Ok(ElementBox {
                width: 0.0,
                height: 0.0,
                display: "none".into(),
                visibility: "visible".into(),
                background_color,
            });
        }

        let font_size = font_size_px(&spec);
        let chars = spec.text.as_deref().map(|t| t.chars().count()).unwrap_or(0);
        let mut width = chars as f64 * font_size * 0.6;
        let height = if chars == 0 { 0.0 } else { (font_size * 1.15).round() };
        width += self.perturbation(NoiseTarget::ClientRects) as f64 * 0.001;

        Ok(ElementBox {
            width,
            height,
            display: spec.style("display").unwrap_or("block").to_string(),
            visibility: spec.style("visibility").unwrap_or("visible").to_string(),
            background_color,
        })
    }

    fn remove_element(&self, node: NodeId) -> Result<(), ProbeFault> {
        if self.with_dom(|dom| dom.remove_subtree(node))? {
            Ok(())
        } else {
            Err(ProbeFault::failed(format!("node {node} is not attached")))
        }
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.with_dom(|dom| dom.nodes.contains_key(&node))
            .unwrap_or(false)
    }

    async fn next_frame(&self) {
        sleep(Duration::from_millis(16)).await;
    }

    async fn render_canvas(&self, scene: &CanvasScene) -> Result<String, ProbeFault> {
        self.canvas.call().await?;
        let mut hasher = DefaultHasher::new();
        scene.hash(&mut hasher);
        self.navigator.user_agent.hash(&mut hasher);
        self.perturbation(NoiseTarget::Canvas).hash(&mut hasher);
        Ok(format!("data:image/png;base64,{:016x}", hasher.finish()))
    }

    async fn render_audio(&self, spec: &OscillatorSpec) -> Result<Vec<f32>, ProbeFault> {
        self.audio.call().await?;
        let step = spec.frequency_hz / f64::from(spec.sample_rate);
        let mut samples: Vec<f32> = (0..spec.length)
            .map(|i| {
                let phase = i as f64 * step;
                let triangle = 2.0 * (2.0 * (phase - (phase + 0.5).floor())).abs() - 1.0;
                // Compressor knee squashes peaks a little.
                (triangle * 0.8) as f32
            })
            .collect();
        let jitter = self.perturbation(NoiseTarget::Audio);
        if let Some(first) = samples.first_mut() {
            *first += jitter as f32 * 1e-4;
        }
        Ok(samples)
    }

    async fn request_geolocation(&self, prompt_timeout: Duration) -> Result<(), ProbeFault> {
        match tokio::time::timeout(prompt_timeout, self.geolocation.call()).await {
            Ok(result) => result,
            Err(_) => Err(ProbeFault::Timeout),
        }
    }

    async fn battery(&self) -> Result<BatteryStatus, ProbeFault> {
        self.battery.call().await
    }

    async fn media_devices(&self) -> Result<Vec<MediaDeviceKind>, ProbeFault> {
        self.media_devices.call().await
    }

    fn speech_voice_count(&self) -> Result<usize, ProbeFault> {
        self.speech_voices.clone()
    }

    async fn load_script(&self, url: &str) -> Result<NodeId, ProbeFault> {
        let spec = ElementSpec::new("script").with_attribute("src", url);
        let script = ScopedElement::create(self, &spec, None)?;
        self.script_load.call().await?;
        Ok(script.release())
    }

    fn render_reference_scene(&self, _scene: &SceneSpec) -> Result<[u8; 4], ProbeFault> {
        self.scene_pixel.clone()
    }

    async fn request_gpu_adapter(&self) -> Result<Option<GpuAdapter>, ProbeFault> {
        self.gpu_adapter.call().await
    }

    async fn gpu_adapter_info(&self, _adapter: &GpuAdapter) -> Result<Option<AdapterInfo>, ProbeFault> {
        self.gpu_info.call().await
    }
}
