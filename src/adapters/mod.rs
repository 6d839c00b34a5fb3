pub mod alpaca;
pub mod api_server;
pub mod execution;
pub mod llm;
pub mod market_data;

pub use alpaca::AlpacaClient;
pub use api_server::{start_api_server, start_api_server_background};
pub use execution::{ExecutionGateway, PaperGateway};
pub use llm::{CannedTextGenerator, ChatCompletionsClient, ChatTurn, TextGenerator};
pub use market_data::{MarketDataProvider, SyntheticMarketData};
