//! Attribute keys written into the fingerprint map and noise map.

pub const USER_AGENT: &str = "user_agent";
pub const TIMEZONE: &str = "timezone";
pub const TIMEZONE_OFFSET: &str = "timezone_offset_minutes";
pub const LANGUAGE: &str = "language";
pub const LANGUAGES: &str = "languages";
pub const SCREEN_RESOLUTION: &str = "screen_resolution";
pub const AVAILABLE_SCREEN: &str = "available_screen";
pub const COLOR_DEPTH: &str = "color_depth";
pub const COOKIES_ENABLED: &str = "cookies_enabled";
pub const HARDWARE_CONCURRENCY: &str = "hardware_concurrency";
pub const MAX_TOUCH_POINTS: &str = "max_touch_points";
pub const DEVICE_MEMORY: &str = "device_memory_gb";
pub const BLUETOOTH: &str = "bluetooth";
pub const EFFECTIVE_NETWORK_TYPE: &str = "effective_network_type";
pub const DOWNLINK: &str = "downlink_mbps";
pub const RTT: &str = "rtt_ms";
pub const DO_NOT_TRACK: &str = "do_not_track";
pub const MATH_PRECISION: &str = "math_precision";
pub const WEBGL_RENDERER: &str = "webgl_renderer";
pub const WEBDRIVER: &str = "webdriver";
pub const CLIENT_RECTS: &str = "client_rects_fingerprint";

pub const CANVAS: &str = "canvas_fingerprint";
pub const AUDIO: &str = "audio_fingerprint";
pub const GEOLOCATION: &str = "geolocation";
pub const AD_BLOCKER: &str = "ad_blocker";
pub const THEME_CHANGER: &str = "theme_changer";
pub const BATTERY: &str = "battery";
pub const MEDIA_DEVICES: &str = "media_devices";
pub const SPEECH_VOICES: &str = "speech_voices";
pub const CPU_TIMING: &str = "cpu_timing_ms";
pub const WEBGL_SCENE: &str = "webgl_scene_render";
pub const WEBGPU_ADAPTER: &str = "webgpu_adapter";

/// Noise map entries, keyed by the name of the sampled probe.
pub mod noise {
    pub const CANVAS: &str = "canvas";
    pub const AUDIO: &str = "audio";
    pub const CLIENT_RECTS: &str = "client_rects";
}
