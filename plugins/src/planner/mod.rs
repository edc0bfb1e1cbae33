mod keyword;

pub use keyword::KeywordPlanner;
