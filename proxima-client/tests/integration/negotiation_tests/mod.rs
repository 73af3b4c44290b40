mod test_offer_answer_flow;
mod test_signals_for_unknown_peers;
