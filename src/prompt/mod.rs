//! Prompt 层：模板渲染、情景记忆 prompt、交接消息与上下文组装

pub mod assembler;
pub mod episodic;
pub mod handoff;
pub mod renderer;

pub use assembler::ContextAssembler;
pub use episodic::render_episodic_summary;
pub use renderer::{PlaceholderRenderer, TemplateRenderer};
