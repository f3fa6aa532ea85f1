mod multi_threaded_test;
mod transaction_commit_test;
mod transaction_fault_test;
