use tracing::debug;

use crate::config::ClientConfig;
use crate::control::{
    CommandDispatcher, ACTION_DISPLAY_PIN_CODE, URN_REMOTE_CONTROL, URN_RENDERING_CONTROL,
};
use crate::envelope::{escape_text, extract_tag, text_element};
use crate::error::VieraError;
use crate::handshake::transport::{HttpSoapTransport, SoapTransport, TimeoutTransport};
use crate::session::{Credentials, Session, SessionMode};
use crate::sdk::keys::RemoteKey;

const MASTER_CHANNEL: &str = "<InstanceID>0</InstanceID><Channel>Master</Channel>";

/// High-level client for one TV.
///
/// # Guarantees
/// * Encrypted sessions are fully established before `connect` returns.
/// * Every method is a single action sent through the [`CommandDispatcher`], so
///   calls from several tasks are serialized and keep the sequence number in step.
/// * Responses are parsed for one known tag; a missing tag is
///   [`VieraError::MissingField`].
#[derive(Debug)]
pub struct VieraClient<T = TimeoutTransport<HttpSoapTransport>> {
    dispatcher: CommandDispatcher<T>,
}

impl VieraClient {
    /// Connects with the default configuration over HTTP.
    ///
    /// Pass `credentials` for models that require encrypted commands; without
    /// them the session is plain and no handshake takes place.
    ///
    /// # Errors
    /// `InvalidAddress` for anything but an IPv4 literal, `InvalidKeyFormat` for a
    /// malformed encryption key and `HandshakeFailed` when the TV does not hand
    /// out a session id.
    pub async fn connect(
        address: &str,
        credentials: Option<Credentials>,
    ) -> Result<Self, VieraError> {
        Self::connect_with_config(address, credentials, ClientConfig::default()).await
    }

    pub async fn connect_with_config(
        address: &str,
        credentials: Option<Credentials>,
        config: ClientConfig,
    ) -> Result<Self, VieraError> {
        config.validate()?;
        let transport = TimeoutTransport::new(HttpSoapTransport::new()?, config.request_timeout());
        Self::connect_with_transport(address, credentials, config, transport).await
    }
}

impl<T> VieraClient<T>
where
    T: SoapTransport,
{
    /// Connects over a caller-supplied transport.
    pub async fn connect_with_transport(
        address: &str,
        credentials: Option<Credentials>,
        config: ClientConfig,
        transport: T,
    ) -> Result<Self, VieraError> {
        let session = Session::new(address, credentials)?;
        let encrypted = session.mode() == SessionMode::Encrypted;
        let dispatcher = CommandDispatcher::new(session, transport, config);
        if encrypted {
            dispatcher.handshake().await?;
        }
        Ok(Self { dispatcher })
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<T> {
        &self.dispatcher
    }

    async fn remote_control(&self, action: &str, parameters: &str) -> Result<String, VieraError> {
        let path = &self.dispatcher.config().remote_control_path;
        self.dispatcher
            .send(path, URN_REMOTE_CONTROL, action, parameters)
            .await
    }

    async fn rendering_control(
        &self,
        action: &str,
        parameters: &str,
    ) -> Result<String, VieraError> {
        let path = &self.dispatcher.config().rendering_control_path;
        self.dispatcher
            .send(path, URN_RENDERING_CONTROL, action, parameters)
            .await
    }

    /// Asks the TV to show a pairing PIN, labelled with `device_name`.
    pub async fn request_pin_code(&self, device_name: &str) -> Result<String, VieraError> {
        self.remote_control(
            ACTION_DISPLAY_PIN_CODE,
            &text_element("X_DeviceName", device_name),
        )
        .await
    }

    pub async fn send_key(&self, key: RemoteKey) -> Result<String, VieraError> {
        self.send_key_code(key.code()).await
    }

    /// Sends a raw NRC key code; the code is upper-cased first.
    pub async fn send_key_code(&self, code: &str) -> Result<String, VieraError> {
        debug!(code, "sending key");
        self.remote_control(
            "X_SendKey",
            &text_element("X_KeyEvent", &code.to_uppercase()),
        )
        .await
    }

    /// Switches to HDMI input `input` (1-based, as printed on the TV).
    pub async fn send_hdmi(&self, input: u8) -> Result<String, VieraError> {
        if input == 0 {
            return Err(VieraError::InvalidArgument("HDMI inputs start at 1".into()));
        }
        self.send_key_code(&format!("NRC_HDMI{}-ONOFF", input - 1))
            .await
    }

    pub async fn launch_app(&self, product_id: &str) -> Result<String, VieraError> {
        let parameters = format!(
            "<X_AppType>vc_app</X_AppType><X_LaunchKeyword>product_id={}</X_LaunchKeyword>",
            escape_text(product_id)
        );
        self.remote_control("X_LaunchApp", &parameters).await
    }

    pub async fn get_volume(&self) -> Result<u8, VieraError> {
        let body = self.rendering_control("GetVolume", MASTER_CHANNEL).await?;
        extract_tag(&body, "CurrentVolume")?
            .and_then(|v| v.trim().parse::<u8>().ok())
            .ok_or_else(|| VieraError::MissingField("CurrentVolume".into()))
    }

    /// Sets the volume; accepted range is 0 to 100.
    pub async fn set_volume(&self, volume: u8) -> Result<String, VieraError> {
        if volume > 100 {
            return Err(VieraError::InvalidArgument(format!(
                "volume {} is outside 0..=100",
                volume
            )));
        }
        let parameters = format!("{}<DesiredVolume>{}</DesiredVolume>", MASTER_CHANNEL, volume);
        self.rendering_control("SetVolume", &parameters).await
    }

    pub async fn get_mute(&self) -> Result<bool, VieraError> {
        let body = self.rendering_control("GetMute", MASTER_CHANNEL).await?;
        match extract_tag(&body, "CurrentMute")?.map(str::trim) {
            Some("1") => Ok(true),
            Some("0") => Ok(false),
            _ => Err(VieraError::MissingField("CurrentMute".into())),
        }
    }

    pub async fn set_mute(&self, enable: bool) -> Result<String, VieraError> {
        let parameters = format!(
            "{}<DesiredMute>{}</DesiredMute>",
            MASTER_CHANNEL,
            if enable { '1' } else { '0' }
        );
        self.rendering_control("SetMute", &parameters).await
    }
}
