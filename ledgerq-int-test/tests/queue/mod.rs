mod queue_store_test;
