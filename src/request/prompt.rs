use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart, ImageDetail,
    ImageUrlArgs,
};
use eyre::Result;

use crate::{
    config::{get_sys_gen_template, USER_GEN_TEMPLATE},
    preferences::Preferences,
};

/// The instruction pair sent with every screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// The language goes in verbatim; every other selection is lower-cased.
    pub fn from_preferences(preferences: &Preferences) -> Self {
        let user = USER_GEN_TEMPLATE
            .replace("{language}", &preferences.language.to_string())
            .replace("{style}", &preferences.style.to_string().to_lowercase())
            .replace("{depth}", &preferences.depth.to_string().to_lowercase())
            .replace("{extra}", &preferences.extra.to_string().to_lowercase());
        Self {
            system: get_sys_gen_template().to_string(),
            user: user.trim().to_string(),
        }
    }

    /// Build the chat messages: instructions as the system turn, then the user text
    /// and the single image in one user turn.
    pub fn to_chatgpt_message(&self, image_url: &str) -> Result<Vec<ChatCompletionRequestMessage>> {
        let parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(self.user.clone())
                .build()?
                .into(),
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(
                    ImageUrlArgs::default()
                        .url(image_url)
                        .detail(ImageDetail::Auto)
                        .build()?,
                )
                .build()?
                .into(),
        ];
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system.clone())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(parts)
                .build()?
                .into(),
        ];
        Ok(messages)
    }
}
