mod engine_scenarios;
mod rag_ranking;
