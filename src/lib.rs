//! ytdlp-driver - Drive yt-dlp downloads with structured progress events.

pub mod command;
pub mod config;
pub mod display;
pub mod parser;
pub mod runner;
pub mod sink;
