pub mod gateway;
pub mod provider;

pub use gateway::{parse_verdict, VerificationGateway, Verdict};
pub use provider::{
    create_judge, encode_image, AnthropicProvider, EncodedImage, JudgeRequest,
    OpenAICompatibleProvider, VisionJudge,
};
